//! Auth-change events.
//!
//! Credential stores broadcast an [`AuthChange`] whenever the session
//! transitions. The session context reacts to the sign-in/refresh/sign-out
//! subset only; everything else must be ignored to prevent duplicate
//! refresh loops.

use staffport_core::Session;

/// A session transition emitted by a credential store.
#[derive(Debug, Clone)]
pub enum AuthChange {
    /// A credential exchange succeeded and a session now exists.
    SignedIn(Session),

    /// Token material was rotated; the session identity is unchanged.
    TokenRefreshed(Session),

    /// The session was destroyed (explicit sign-out or revocation).
    SignedOut,

    /// A password-recovery flow started. Consumers must not re-fetch
    /// state for this event.
    PasswordRecovery,
}

impl AuthChange {
    /// The session carried by the event, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(s) | Self::TokenRefreshed(s) => Some(s),
            Self::SignedOut | Self::PasswordRecovery => None,
        }
    }
}
