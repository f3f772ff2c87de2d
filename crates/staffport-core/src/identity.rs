//! Identity and profile types.
//!
//! An [`Identity`] is the authenticated principal as the identity backend
//! reports it. A [`Profile`] is the portal's own row keyed by the identity
//! id, carrying the role that decides portal access. Both are read-only
//! projections; provisioning happens outside this system.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Identity
// =============================================================================

/// An authenticated principal.
///
/// Created and owned by the identity backend; referenced, never mutated,
/// by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique identifier assigned by the identity backend.
    pub id: Uuid,

    /// Email address the principal authenticated with.
    pub email: String,
}

// =============================================================================
// Role
// =============================================================================

/// Enumerated permission tier stored on a [`Profile`].
///
/// Unknown role strings round-trip through [`Role::Other`] rather than
/// failing deserialization; an unknown role simply does not grant access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Employee,
    Manager,
    Admin,
    Other(String),
}

impl Role {
    /// Returns `true` if this role admits the holder into the portal.
    ///
    /// This is the single access predicate shared by the edge gatekeeper
    /// and the dashboard's client-side re-check; keep both enforcement
    /// points on this function so the rules cannot diverge.
    #[must_use]
    pub fn grants_portal_access(&self) -> bool {
        matches!(self, Self::Employee | Self::Manager | Self::Admin)
    }

    /// Canonical string form as stored in the profile row.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "employee" => Self::Employee,
            "manager" => Self::Manager,
            "admin" => Self::Admin,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Profile
// =============================================================================

/// Portal-specific metadata for an [`Identity`].
///
/// The row is keyed by the identity id. A missing row means "not
/// authorized", never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity this profile belongs to (primary key).
    pub id: Uuid,

    /// Display name shown in the portal chrome.
    pub display_name: String,

    /// Permission tier.
    pub role: Role,

    /// Timestamp the row was provisioned.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Profile {
    /// Returns `true` if this profile's role admits portal access.
    #[must_use]
    pub fn grants_portal_access(&self) -> bool {
        self.role.grants_portal_access()
    }
}

/// Derived authorization flag: `true` iff a profile exists and its role
/// qualifies.
///
/// Always computed from the current profile value, never stored, so it can
/// never go stale relative to the last committed profile.
#[must_use]
pub fn is_staff(profile: Option<&Profile>) -> bool {
    profile.is_some_and(Profile::grants_portal_access)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_role(role: Role) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            display_name: "Test User".to_string(),
            role,
            created_at: None,
        }
    }

    #[test]
    fn test_staff_roles_grant_access() {
        assert!(Role::Employee.grants_portal_access());
        assert!(Role::Manager.grants_portal_access());
        assert!(Role::Admin.grants_portal_access());
    }

    #[test]
    fn test_other_roles_deny_access() {
        assert!(!Role::Other("client".to_string()).grants_portal_access());
        assert!(!Role::Other(String::new()).grants_portal_access());
    }

    #[test]
    fn test_role_round_trips_unknown_strings() {
        let role: Role = serde_json::from_str("\"contractor\"").unwrap();
        assert_eq!(role, Role::Other("contractor".to_string()));
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"contractor\"");
    }

    #[test]
    fn test_role_parses_known_strings() {
        let role: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, Role::Manager);
    }

    #[test]
    fn test_is_staff_requires_profile() {
        assert!(!is_staff(None));
        assert!(is_staff(Some(&profile_with_role(Role::Employee))));
        assert!(!is_staff(Some(&profile_with_role(Role::Other(
            "client".to_string()
        )))));
    }
}
