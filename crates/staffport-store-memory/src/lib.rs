//! # staffport-store-memory
//!
//! In-memory [`CredentialStore`] and [`Directory`] backend.
//!
//! Used for local development and tests. Rows are seeded through the
//! `seed_*` methods; passwords are stored as argon2 hashes. Session
//! behavior matches the HTTP backend: tokens rotate transparently inside
//! the refresh window, expiry without refresh destroys the session, and
//! every transition is broadcast as an [`AuthChange`].

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use staffport_auth::{AuthChange, AuthError, AuthResult, CredentialStore, Directory, TokenResolution};
use staffport_core::{Client, ClientAssignment, Identity, Profile, Session};

const EVENT_CAPACITY: usize = 16;

/// Default session lifetime for issued sessions.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::hours(1);

struct SeededUser {
    identity: Identity,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    users: Vec<SeededUser>,
    profiles: HashMap<Uuid, Profile>,
    clients: HashMap<Uuid, Client>,
    assignments: Vec<ClientAssignment>,
    /// Live sessions keyed by access token.
    sessions: HashMap<String, Session>,
    /// Access token of the session this process signed in with.
    current: Option<String>,
}

/// In-memory credential store and directory.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<AuthChange>,
    session_lifetime: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default session lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_session_lifetime(DEFAULT_SESSION_LIFETIME)
    }

    /// Creates an empty store issuing sessions valid for `lifetime`.
    #[must_use]
    pub fn with_session_lifetime(lifetime: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
            session_lifetime: lifetime,
        }
    }

    /// Seeds a user with an argon2-hashed password and an optional
    /// profile row. Returns the created identity.
    pub fn seed_user(
        &self,
        email: &str,
        password: &str,
        profile: Option<(&str, staffport_core::Role)>,
    ) -> AuthResult<Identity> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::storage(format!("password hashing failed: {e}")))?
            .to_string();

        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        let mut inner = self.write();
        if let Some((display_name, role)) = profile {
            inner.profiles.insert(
                identity.id,
                Profile {
                    id: identity.id,
                    display_name: display_name.to_string(),
                    role,
                    created_at: Some(time::OffsetDateTime::now_utc()),
                },
            );
        }
        inner.users.push(SeededUser {
            identity: identity.clone(),
            password_hash,
        });
        Ok(identity)
    }

    /// Seeds a client row.
    pub fn seed_client(&self, client: Client) {
        self.write().clients.insert(client.id, client);
    }

    /// Seeds an assignment link row.
    pub fn seed_assignment(&self, assignment: ClientAssignment) {
        self.write().assignments.push(assignment);
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthChange) {
        // No receivers is fine; the send result only reports that.
        let _ = self.events.send(event);
    }

    /// Replaces `old_access`'s session with freshly issued token
    /// material for the same identity.
    fn rotate(inner: &mut Inner, old_access: &str, lifetime: Duration) -> Option<Session> {
        let old = inner.sessions.remove(old_access)?;
        let replacement = Session::issue(old.user, lifetime);
        inner
            .sessions
            .insert(replacement.access_token.clone(), replacement.clone());
        if inner.current.as_deref() == Some(old_access) {
            inner.current = Some(replacement.access_token.clone());
        }
        Some(replacement)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let event;
        let result;
        {
            let mut inner = self.write();
            let Some(token) = inner.current.clone() else {
                return Ok(None);
            };
            let Some(session) = inner.sessions.get(&token).cloned() else {
                inner.current = None;
                return Ok(None);
            };
            if session.is_expired() {
                inner.sessions.remove(&token);
                inner.current = None;
                event = Some(AuthChange::SignedOut);
                result = None;
            } else if session.needs_refresh() {
                let refreshed = Self::rotate(&mut inner, &token, self.session_lifetime);
                event = refreshed.clone().map(AuthChange::TokenRefreshed);
                result = refreshed;
            } else {
                event = None;
                result = Some(session);
            }
        }
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(result)
    }

    async fn get_user(&self) -> AuthResult<Option<Identity>> {
        let inner = self.read();
        let Some(token) = inner.current.as_deref() else {
            return Ok(None);
        };
        Ok(inner
            .sessions
            .get(token)
            .filter(|s| !s.is_expired())
            .map(|s| s.user.clone()))
    }

    async fn resolve_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<Option<TokenResolution>> {
        let event;
        let resolution;
        {
            let mut inner = self.write();

            let live = access_token
                .and_then(|t| inner.sessions.get(t).map(|s| (t.to_string(), s.clone())))
                .filter(|(_, s)| !s.is_expired());

            if let Some((token, session)) = live {
                if session.needs_refresh() {
                    let refreshed = Self::rotate(&mut inner, &token, self.session_lifetime);
                    event = refreshed.clone().map(AuthChange::TokenRefreshed);
                    resolution = refreshed.map(|s| TokenResolution {
                        user: s.user.clone(),
                        refreshed: Some(s),
                    });
                } else {
                    event = None;
                    resolution = Some(TokenResolution {
                        user: session.user,
                        refreshed: None,
                    });
                }
            } else if let Some(rt) = refresh_token {
                // Access token dead or absent; fall back to the refresh
                // token and rotate the whole session.
                let found = inner
                    .sessions
                    .iter()
                    .find(|(_, s)| s.refresh_token == rt)
                    .map(|(token, _)| token.clone());
                match found {
                    Some(token) => {
                        let refreshed = Self::rotate(&mut inner, &token, self.session_lifetime);
                        event = refreshed.clone().map(AuthChange::TokenRefreshed);
                        resolution = refreshed.map(|s| TokenResolution {
                            user: s.user.clone(),
                            refreshed: Some(s),
                        });
                    }
                    None => {
                        event = None;
                        resolution = None;
                    }
                }
            } else {
                event = None;
                resolution = None;
            }
        }
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(resolution)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session;
        {
            let mut inner = self.write();
            let user = inner
                .users
                .iter()
                .find(|u| u.identity.email == email)
                .ok_or_else(|| AuthError::unauthorized("Invalid login credentials"))?;

            let parsed = PasswordHash::new(&user.password_hash)
                .map_err(|e| AuthError::storage(format!("stored hash unreadable: {e}")))?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|_| AuthError::unauthorized("Invalid login credentials"))?;

            session = Session::issue(user.identity.clone(), self.session_lifetime);
            inner
                .sessions
                .insert(session.access_token.clone(), session.clone());
            inner.current = Some(session.access_token.clone());
        }
        self.emit(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let had_session;
        {
            let mut inner = self.write();
            had_session = match inner.current.take() {
                Some(token) => inner.sessions.remove(&token).is_some(),
                None => false,
            };
        }
        if had_session {
            self.emit(AuthChange::SignedOut);
        }
        Ok(())
    }

    async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let removed;
        {
            let mut inner = self.write();
            removed = inner.sessions.remove(access_token).is_some();
            if inner.current.as_deref() == Some(access_token) {
                inner.current = None;
            }
        }
        if removed {
            self.emit(AuthChange::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> AuthResult<Option<Profile>> {
        Ok(self.read().profiles.get(&user_id).cloned())
    }

    async fn assigned_clients(&self, employee_id: Uuid) -> AuthResult<Vec<Client>> {
        let inner = self.read();
        let visible: HashSet<Uuid> = inner
            .assignments
            .iter()
            .filter(|a| a.employee_id == employee_id && a.is_active)
            .map(|a| a.client_id)
            .collect();
        let mut clients: Vec<Client> = inner
            .clients
            .values()
            .filter(|c| visible.contains(&c.id))
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffport_auth::ClientResolver;
    use staffport_core::Role;
    use std::sync::Arc;

    fn seeded_store() -> (MemoryStore, Identity) {
        let store = MemoryStore::new();
        let identity = store
            .seed_user("ana@example.com", "hunter2", Some(("Ana", Role::Employee)))
            .unwrap();
        (store, identity)
    }

    fn client(name: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            contact_email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn assignment(employee: &Identity, client: &Client, is_active: bool) -> ClientAssignment {
        ClientAssignment {
            employee_id: employee.id,
            client_id: client.id,
            is_active,
        }
    }

    #[tokio::test]
    async fn test_sign_in_issues_session_and_emits_event() {
        let (store, identity) = seeded_store();
        let mut events = store.subscribe();

        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(session.user_id(), identity.id);
        let event = events.try_recv().unwrap();
        assert!(matches!(event, AuthChange::SignedIn(_)));
        // The event carries the same token material the caller received.
        assert_eq!(
            event.session().map(|s| s.access_token.as_str()),
            Some(session.access_token.as_str())
        );
        assert!(store.get_user().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_credentials() {
        let (store, _) = seeded_store();
        assert!(
            store
                .sign_in_with_password("ana@example.com", "wrong")
                .await
                .is_err()
        );
        assert!(
            store
                .sign_in_with_password("nobody@example.com", "hunter2")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_resolve_tokens_with_live_access_token() {
        let (store, identity) = seeded_store();
        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();

        let resolution = store
            .resolve_tokens(Some(&session.access_token), Some(&session.refresh_token))
            .await
            .unwrap()
            .expect("token should resolve");
        assert_eq!(resolution.user.id, identity.id);
        assert!(resolution.refreshed.is_none());
    }

    #[tokio::test]
    async fn test_resolve_tokens_rotates_near_expiry() {
        let store = MemoryStore::with_session_lifetime(Duration::minutes(2));
        store
            .seed_user("ana@example.com", "hunter2", Some(("Ana", Role::Employee)))
            .unwrap();
        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();
        assert!(session.needs_refresh());

        let resolution = store
            .resolve_tokens(Some(&session.access_token), None)
            .await
            .unwrap()
            .expect("token should resolve");
        let refreshed = resolution.refreshed.expect("session should rotate");
        assert_ne!(refreshed.access_token, session.access_token);

        // The old access token is gone.
        assert!(
            store
                .resolve_tokens(Some(&session.access_token), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_resolve_tokens_falls_back_to_refresh_token() {
        let (store, identity) = seeded_store();
        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();

        let resolution = store
            .resolve_tokens(Some("stale-access-token"), Some(&session.refresh_token))
            .await
            .unwrap()
            .expect("refresh token should resolve");
        assert_eq!(resolution.user.id, identity.id);
        assert!(resolution.refreshed.is_some());
    }

    #[tokio::test]
    async fn test_revoke_invalidates_session() {
        let (store, _) = seeded_store();
        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();

        store.revoke(&session.access_token).await.unwrap();
        assert!(
            store
                .resolve_tokens(Some(&session.access_token), Some(&session.refresh_token))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.get_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_twice_is_not_an_error() {
        let (store, _) = seeded_store();
        store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();
        store.sign_out().await.unwrap();
        store.sign_out().await.unwrap();
        assert!(store.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_row_not_found_is_none() {
        let (store, _) = seeded_store();
        assert!(store.profile(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assigned_clients_scoping_and_order() {
        let (store, u1) = seeded_store();
        let u2 = store.seed_user("ben@example.com", "hunter2", None).unwrap();

        // u1: active assignments to A2 and A1, inactive to A3.
        let a1 = client("A1 Widgets");
        let a2 = client("A2 Gadgets");
        let a3 = client("A3 Gizmos");
        let unrelated = client("Zed Corp");
        for c in [&a1, &a2, &a3, &unrelated] {
            store.seed_client(c.clone());
        }
        store.seed_assignment(assignment(&u1, &a2, true));
        store.seed_assignment(assignment(&u1, &a1, true));
        store.seed_assignment(assignment(&u1, &a3, false));
        store.seed_assignment(assignment(&u2, &unrelated, true));

        let clients = store.assigned_clients(u1.id).await.unwrap();
        let names: Vec<&str> = clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A1 Widgets", "A2 Gadgets"]);
    }

    #[tokio::test]
    async fn test_zero_assignments_is_empty_not_error() {
        let (store, u1) = seeded_store();
        assert!(store.assigned_clients(u1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_over_memory_directory() {
        let (store, u1) = seeded_store();
        let a1 = client("A1 Widgets");
        let a2 = client("A2 Gadgets");
        let a3 = client("A3 Gizmos");
        for c in [&a1, &a2, &a3] {
            store.seed_client(c.clone());
        }
        store.seed_assignment(assignment(&u1, &a1, true));
        store.seed_assignment(assignment(&u1, &a2, true));
        store.seed_assignment(assignment(&u1, &a3, false));

        let store = Arc::new(store);
        let resolver = ClientResolver::new(store.clone());
        let view = resolver.resolve(Some(&u1)).await;
        assert!(!view.loading);
        let names: Vec<&str> = view.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A1 Widgets", "A2 Gadgets"]);
    }
}
