//! Client records and assignment links.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client record owned by the data backend.
///
/// The portal treats clients as read-only and only ever sees the subset
/// matching the current identity's active assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier.
    pub id: Uuid,

    /// Display name; the resolver orders result sets by this field.
    pub name: String,

    /// Contact email.
    pub contact_email: String,
}

/// Link row granting one employee visibility into one client.
///
/// A client is visible to an employee iff an assignment row links them
/// with `is_active` set. Rows are created and deactivated by provisioning
/// processes outside the portal; this system only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssignment {
    /// Identity the assignment grants visibility to.
    pub employee_id: Uuid,

    /// The client made visible.
    pub client_id: Uuid,

    /// Inactive assignments grant nothing; they are kept for audit.
    pub is_active: bool,
}
