//! Credential store and directory traits.
//!
//! These are the seams between the portal and its external identity/data
//! backend. Implementations are provided in separate crates:
//!
//! - `staffport-store-memory` - in-memory backend for local dev and tests
//! - `staffport-store-http` - HTTP backend against the identity service
//!
//! Exactly one store object exists for the lifetime of the application.
//! It is constructed once in `main` and threaded through application state
//! as an `Arc<dyn CredentialStore>`; constructing a second instance would
//! duplicate background listeners and is not supported.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use staffport_core::{Client, Identity, Profile, Session};

use crate::AuthResult;
use crate::events::AuthChange;

/// Outcome of resolving raw token material at the network edge.
#[derive(Debug, Clone)]
pub struct TokenResolution {
    /// The verified identity the tokens belong to.
    pub user: Identity,

    /// Replacement session, present when the store rotated the tokens
    /// during resolution. The caller must persist the new token material
    /// onto its outgoing response or the session silently dies on the
    /// next navigation.
    pub refreshed: Option<Session>,
}

/// Client for the external identity backend.
///
/// Owns the authoritative session state: issues sessions on credential
/// exchange, refreshes them transparently near expiry, and destroys them
/// on sign-out.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the current session, refreshing it first if it is inside
    /// the refresh window. `Ok(None)` means signed out.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Returns the server-verified identity of the current session.
    async fn get_user(&self) -> AuthResult<Option<Identity>>;

    /// Verifies raw token material from a request (cookies) and resolves
    /// it to an identity, rotating the session if it is near expiry.
    ///
    /// Returns `Ok(None)` when neither token resolves to a live session.
    /// Backend failures are errors; callers at the edge treat them as
    /// "no user".
    async fn resolve_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<Option<TokenResolution>>;

    /// Exchanges credentials for a new session and makes it current.
    /// Emits [`AuthChange::SignedIn`] on success.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Destroys the current session. Emits [`AuthChange::SignedOut`].
    /// Signing out while already signed out is not an error.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Invalidates the session owning `access_token`, whether or not it
    /// is the current one. Used by the edge gatekeeper to force sign-out
    /// on a disqualified role so a stale session cannot retry.
    async fn revoke(&self, access_token: &str) -> AuthResult<()>;

    /// Subscribes to session transitions. Dropping the receiver is the
    /// disposal; a store never keeps per-subscriber state.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Row queries against the portal's data backend.
///
/// All reads; provisioning happens elsewhere.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetches the profile row for an identity.
    ///
    /// A missing row is `Ok(None)` - "not authorized", never an error.
    async fn profile(&self, user_id: Uuid) -> AuthResult<Option<Profile>>;

    /// Returns the clients visible to `employee_id`: exactly those with
    /// at least one assignment row where `is_active` is set (inner-join
    /// semantics - clients with only inactive or missing assignments must
    /// not appear), ordered by name ascending.
    async fn assigned_clients(&self, employee_id: Uuid) -> AuthResult<Vec<Client>>;
}
