//! Auth settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::gate::GateConfig;

/// Settings for the session lifecycle and the edge gatekeeper.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// fetch_timeout = "5s"
///
/// [auth.gate]
/// protected_prefix = "/dashboard"
/// login_path = "/login"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Upper bound on a single session or profile fetch. A timed-out
    /// fetch degrades to "unauthenticated".
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Gatekeeper route configuration.
    pub gate: GateConfig,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            gate: GateConfig::default(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl AuthSettings {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the fetch timeout is zero
    /// or a gate path does not start with `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "fetch_timeout must be > 0".to_string(),
            ));
        }
        for (name, path) in [
            ("gate.protected_prefix", &self.gate.protected_prefix),
            ("gate.login_path", &self.gate.login_path),
        ] {
            if !path.starts_with('/') || path.len() < 2 {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be an absolute path, got '{path}'"
                )));
            }
        }
        Ok(())
    }
}
