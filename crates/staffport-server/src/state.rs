//! Shared application state.

use std::sync::Arc;

use staffport_auth::{ClientResolver, CredentialStore, Directory, GateConfig, SessionContext};

/// State threaded through every handler and the gatekeeper.
///
/// `store` and `directory` are the process-wide singletons created once
/// in `main`; the session context hands the same instances out, so no
/// component ever constructs a second backend client.
#[derive(Clone)]
pub struct AppState {
    /// Shared session/user/profile state.
    pub ctx: Arc<SessionContext>,

    /// Scoped client-access resolver.
    pub resolver: Arc<ClientResolver>,

    /// Credential store singleton.
    pub store: Arc<dyn CredentialStore>,

    /// Directory singleton.
    pub directory: Arc<dyn Directory>,

    /// Gatekeeper route configuration.
    pub gate: GateConfig,
}

impl AppState {
    /// Builds state around a store/directory pair, wiring the session
    /// context and resolver to the same instances.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        directory: Arc<dyn Directory>,
        gate: GateConfig,
        fetch_timeout: std::time::Duration,
    ) -> Self {
        let ctx = Arc::new(SessionContext::new(
            store.clone(),
            directory.clone(),
            fetch_timeout,
        ));
        let resolver = Arc::new(ClientResolver::new(directory.clone()));
        Self {
            ctx,
            resolver,
            store,
            directory,
            gate,
        }
    }
}
