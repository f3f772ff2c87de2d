//! Scoped client-access resolver.
//!
//! Resolves "clients visible to the current identity" exactly once per
//! identity and hands the same result set to every consuming view, instead
//! of letting each tab re-query the backend.

use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use staffport_core::{Client, Identity};

use crate::store::Directory;

/// What a consuming view receives: the current result set plus a loading
/// flag.
///
/// Loading is `true` only while the first fetch for the current identity
/// is outstanding and nothing is cached for it yet. An identity change
/// drops the previous identity's cache before re-fetching; scoped data is
/// never served across identities.
#[derive(Debug, Clone, Default)]
pub struct ClientsView {
    /// Clients with an active assignment to the identity, ordered by name.
    pub clients: Arc<Vec<Client>>,

    /// `true` until the first result (success or empty) arrives.
    pub loading: bool,
}

impl ClientsView {
    fn empty() -> Self {
        Self::default()
    }
}

struct ResolverState {
    /// Identity the cache belongs to. Fetches happen only when this
    /// changes; consumers may call [`ClientResolver::resolve`] on every
    /// request without causing redundant backend calls.
    identity: Option<Uuid>,

    /// Last-known-good result set.
    clients: Arc<Vec<Client>>,

    /// Whether a fetch for `identity` has ever settled.
    settled: bool,
}

/// Shared resolver for the client list scoped to the current identity.
pub struct ClientResolver {
    directory: Arc<dyn Directory>,
    state: Mutex<ResolverState>,
}

impl ClientResolver {
    /// Creates a resolver over the shared directory instance.
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            state: Mutex::new(ResolverState {
                identity: None,
                clients: Arc::new(Vec::new()),
                settled: false,
            }),
        }
    }

    /// Returns the clients visible to `user`, fetching only when the
    /// identity differs from the cached one.
    ///
    /// - No identity: empty result, `loading = false`, zero backend
    ///   calls - never blocks.
    /// - Fetch failure other than a superseded request: logged, settles
    ///   to the last-known-good (or empty) data with `loading = false`;
    ///   the caller is never left in perpetual loading.
    /// - A superseded request keeps the cache untouched.
    pub async fn resolve(&self, user: Option<&Identity>) -> ClientsView {
        let Some(user) = user else {
            let mut state = self.state.lock().await;
            state.identity = None;
            state.clients = Arc::new(Vec::new());
            state.settled = false;
            return ClientsView::empty();
        };

        let mut state = self.state.lock().await;
        if state.identity == Some(user.id) && state.settled {
            return ClientsView {
                clients: state.clients.clone(),
                loading: false,
            };
        }

        // Identity changed (or first ever resolve): re-fetch. The cache
        // from the previous identity is dropped, not served.
        if state.identity != Some(user.id) {
            state.identity = Some(user.id);
            state.clients = Arc::new(Vec::new());
            state.settled = false;
        }

        match self.directory.assigned_clients(user.id).await {
            Ok(clients) => {
                state.clients = Arc::new(clients);
                state.settled = true;
            }
            Err(e) if e.is_cancellation() => {
                // Superseded by navigation; leave the cache as-is.
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %user.id, "Assigned-clients fetch failed");
                state.settled = true;
            }
        }

        ClientsView {
            clients: state.clients.clone(),
            loading: !state.settled && state.clients.is_empty(),
        }
    }

    /// Non-blocking view of the current cache, for callers that only
    /// render.
    pub async fn current(&self) -> ClientsView {
        let state = self.state.lock().await;
        ClientsView {
            clients: state.clients.clone(),
            loading: state.identity.is_some() && !state.settled && state.clients.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, AuthResult};
    use async_trait::async_trait;
    use staffport_core::Profile;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        clients: Vec<Client>,
        fail: bool,
        cancel: bool,
        calls: AtomicUsize,
    }

    impl CountingDirectory {
        fn with_clients(clients: Vec<Client>) -> Self {
            Self {
                clients,
                fail: false,
                cancel: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Directory for CountingDirectory {
        async fn profile(&self, _user_id: Uuid) -> AuthResult<Option<Profile>> {
            Ok(None)
        }

        async fn assigned_clients(&self, _employee_id: Uuid) -> AuthResult<Vec<Client>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.cancel {
                return Err(AuthError::Cancelled);
            }
            if self.fail {
                return Err(AuthError::storage("backend down"));
            }
            Ok(self.clients.clone())
        }
    }

    fn client(name: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            contact_email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "staff@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_identity_is_empty_and_not_loading() {
        let directory = Arc::new(CountingDirectory::with_clients(vec![client("Acme")]));
        let resolver = ClientResolver::new(directory.clone());

        let view = resolver.resolve(None).await;
        assert!(view.clients.is_empty());
        assert!(!view.loading);
        assert_eq!(directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetches_once_per_identity() {
        let directory =
            Arc::new(CountingDirectory::with_clients(vec![client("Acme"), client("Borea")]));
        let resolver = ClientResolver::new(directory.clone());
        let user = identity();

        let first = resolver.resolve(Some(&user)).await;
        assert_eq!(first.clients.len(), 2);
        assert!(!first.loading);

        // Repeated resolves for the same identity hit the cache.
        for _ in 0..3 {
            let view = resolver.resolve(Some(&user)).await;
            assert_eq!(view.clients.len(), 2);
        }
        assert_eq!(directory.call_count(), 1);
    }

    #[tokio::test]
    async fn test_identity_change_triggers_refetch() {
        let directory = Arc::new(CountingDirectory::with_clients(vec![client("Acme")]));
        let resolver = ClientResolver::new(directory.clone());

        resolver.resolve(Some(&identity())).await;
        resolver.resolve(Some(&identity())).await;
        assert_eq!(directory.call_count(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache_without_backend_calls() {
        let directory = Arc::new(CountingDirectory::with_clients(vec![client("Acme")]));
        let resolver = ClientResolver::new(directory.clone());
        let user = identity();

        resolver.resolve(Some(&user)).await;
        let view = resolver.resolve(None).await;
        assert!(view.clients.is_empty());
        assert!(!view.loading);
        assert_eq!(directory.call_count(), 1);

        // Signing back in re-fetches.
        resolver.resolve(Some(&user)).await;
        assert_eq!(directory.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_settles_instead_of_loading_forever() {
        let directory = Arc::new(CountingDirectory {
            fail: true,
            ..CountingDirectory::with_clients(vec![client("Acme")])
        });
        let resolver = ClientResolver::new(directory);
        let user = identity();

        let view = resolver.resolve(Some(&user)).await;
        assert!(view.clients.is_empty());
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn test_superseded_fetch_keeps_loading_state() {
        let directory = Arc::new(CountingDirectory {
            cancel: true,
            ..CountingDirectory::with_clients(vec![client("Acme")])
        });
        let resolver = ClientResolver::new(directory);
        let user = identity();

        // First fetch superseded: nothing cached yet, still loading.
        let view = resolver.resolve(Some(&user)).await;
        assert!(view.clients.is_empty());
        assert!(view.loading);
    }

    #[tokio::test]
    async fn test_empty_assignment_set_is_not_loading() {
        let directory = Arc::new(CountingDirectory::with_clients(Vec::new()));
        let resolver = ClientResolver::new(directory);

        let view = resolver.resolve(Some(&identity())).await;
        assert!(view.clients.is_empty());
        assert!(!view.loading);
    }
}
