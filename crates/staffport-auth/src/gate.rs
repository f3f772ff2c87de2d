//! Edge gatekeeper route decisions.
//!
//! The decision logic is a pure function so both the HTTP middleware and
//! the tests exercise exactly the same table. The middleware is
//! responsible for resolving the user and profile (failing closed on any
//! backend error) and for executing the decision: performing redirects,
//! propagating refreshed cookies, and forcing sign-out on denial.

use serde::{Deserialize, Serialize};
use staffport_core::Profile;

/// Gatekeeper route configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Path prefix of the protected area.
    pub protected_prefix: String,

    /// Path of the login surface.
    pub login_path: String,

    /// Message attached to the login redirect after a role denial.
    pub denied_message: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            protected_prefix: "/dashboard".to_string(),
            login_path: "/login".to_string(),
            denied_message: "Access denied. Employees only.".to_string(),
        }
    }
}

/// Route classification, evaluated on the raw request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// The bare root path, a role-based redirect dispatcher.
    Root,
    /// Under the protected prefix.
    Protected,
    /// The login surface.
    Login,
    /// Anything else passes through untouched.
    Other,
}

/// What the gatekeeper decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Let the request through unchanged.
    PassThrough,

    /// Redirect to `location` without touching the session.
    Redirect {
        /// Target path (with query, if any).
        location: String,
    },

    /// Invalidate the session, then redirect to `location`.
    ///
    /// Issued when an authenticated user's profile is absent or its role
    /// disqualifies; the forced sign-out prevents repeated access
    /// attempts with the stale session.
    DenyAndSignOut {
        /// Target path carrying the denial message.
        location: String,
    },
}

impl GateConfig {
    /// Returns `true` for paths the gatekeeper never inspects: static
    /// assets and the health endpoint.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        const ASSET_SUFFIXES: &[&str] =
            &[".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico", ".css", ".js"];
        path == "/healthz"
            || path.starts_with("/static/")
            || path.starts_with("/assets/")
            || ASSET_SUFFIXES.iter().any(|s| path.ends_with(s))
    }

    /// Classifies a request path.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        if path == "/" {
            RouteClass::Root
        } else if path.starts_with(&self.protected_prefix) {
            RouteClass::Protected
        } else if path.starts_with(&self.login_path) {
            RouteClass::Login
        } else {
            RouteClass::Other
        }
    }

    /// The gatekeeper decision table, in precedence order:
    ///
    /// 1. root path: to the protected root if a user resolved, else login
    /// 2. protected path without a user: to login
    /// 3. protected path with a user whose profile is absent or
    ///    disqualified: sign out and to login with the denial message
    /// 4. login path with a user: to the protected root
    /// 5. everything else: pass through
    ///
    /// `user_resolved` must already embody the fail-closed rule: a
    /// backend error during resolution counts as "no user".
    #[must_use]
    pub fn decide(
        &self,
        path: &str,
        user_resolved: bool,
        profile: Option<&Profile>,
    ) -> GateDecision {
        match self.classify(path) {
            RouteClass::Root => {
                let target = if user_resolved {
                    &self.protected_prefix
                } else {
                    &self.login_path
                };
                GateDecision::Redirect {
                    location: target.clone(),
                }
            }
            RouteClass::Protected if !user_resolved => GateDecision::Redirect {
                location: self.login_path.clone(),
            },
            RouteClass::Protected => {
                if staffport_core::is_staff(profile) {
                    GateDecision::PassThrough
                } else {
                    GateDecision::DenyAndSignOut {
                        location: self.denied_location(),
                    }
                }
            }
            RouteClass::Login if user_resolved => GateDecision::Redirect {
                location: self.protected_prefix.clone(),
            },
            RouteClass::Login | RouteClass::Other => GateDecision::PassThrough,
        }
    }

    /// Login path with the denial message as a query parameter.
    #[must_use]
    pub fn denied_location(&self) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(self.denied_message.as_bytes()).collect();
        format!("{}?message={}", self.login_path, encoded)
    }
}
