//! Authentication and authorization error types.

/// Errors that can occur during session and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request lacks valid authentication credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// An error occurred while talking to the credential store or the
    /// data backend.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the backend error.
        message: String,
    },

    /// A session or profile fetch exceeded its time bound.
    ///
    /// Treated as "unauthenticated" by consumers, per the fail-closed
    /// policy.
    #[error("Fetch timed out")]
    Timeout,

    /// An in-flight request was superseded by teardown or navigation.
    ///
    /// Never surfaced to the user and never logged as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl AuthError {
    /// Create a new Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a new Storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that mean "the caller went away", which
    /// the swallow-silently policy discards without logging or state
    /// changes.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_classifier() {
        assert!(AuthError::Cancelled.is_cancellation());
        assert!(!AuthError::Timeout.is_cancellation());
        assert!(!AuthError::storage("backend down").is_cancellation());
    }

    #[test]
    fn test_error_display() {
        let err = AuthError::unauthorized("Invalid login credentials");
        assert_eq!(err.to_string(), "Unauthorized: Invalid login credentials");
    }
}
