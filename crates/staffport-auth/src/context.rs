//! Session context: the single source of truth for the current session,
//! user, profile, and derived authorization flag.
//!
//! Every protected view reads the same [`AuthSnapshot`] instead of making
//! its own backend calls, and exactly one subscription to the store's
//! auth-change events exists for the lifetime of the context.
//!
//! State machine: `uninitialized -> loading -> { authenticated-authorized,
//! authenticated-unauthorized, unauthenticated }`. Errors are logged and
//! collapse into `unauthenticated`; the context never hangs, but absence
//! of a good profile always means "unauthorized".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use staffport_core::{Identity, Profile, Session, is_staff};

use crate::events::AuthChange;
use crate::store::{CredentialStore, Directory};

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only projection of the current auth state.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    /// Current session, if any.
    pub session: Option<Session>,

    /// Identity of the current session.
    pub user: Option<Identity>,

    /// Profile row for the identity; `None` means unauthorized.
    pub profile: Option<Profile>,

    /// `true` until the initial session + profile resolution settles.
    pub loading: bool,
}

impl AuthSnapshot {
    fn uninitialized() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// Derived authorization flag, recomputed from the profile on every
    /// call so it can never drift from the last committed profile.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        is_staff(self.profile.as_ref())
    }

    /// Identity id shortcut.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }
}

// =============================================================================
// Session Context
// =============================================================================

/// Owns the auth state shared by every protected view.
///
/// Construct once, call [`initialize`](Self::initialize) once, and tear
/// down with [`shutdown`](Self::shutdown). The context spawns one task
/// consuming the store's auth-change events; teardown cancels it through
/// a [`CancellationToken`], and every pending continuation checks the
/// token before committing state, so a response arriving after teardown
/// is discarded rather than applied.
pub struct SessionContext {
    store: Arc<dyn CredentialStore>,
    directory: Arc<dyn Directory>,
    fetch_timeout: Duration,
    tx: watch::Sender<AuthSnapshot>,
    cancel: CancellationToken,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Creates the context and spawns its event subscription.
    ///
    /// `store` and `directory` are the process-wide singletons; the
    /// context hands them out to descendants via [`store`](Self::store)
    /// and [`directory`](Self::directory) so no consumer constructs its
    /// own.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        directory: Arc<dyn Directory>,
        fetch_timeout: Duration,
    ) -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::uninitialized());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_event_loop(
            store.clone(),
            directory.clone(),
            fetch_timeout,
            tx.clone(),
            cancel.clone(),
        ));

        Self {
            store,
            directory,
            fetch_timeout,
            tx,
            cancel,
            event_task: Mutex::new(Some(task)),
        }
    }

    /// Resolves the current session and, if one exists, the profile for
    /// its user. Runs once at startup; `loading` goes false only after
    /// both steps settle (or the session step settles negatively).
    pub async fn initialize(&self) {
        let session = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = tokio::time::timeout(self.fetch_timeout, self.store.get_session()) => {
                match result {
                    Ok(Ok(session)) => session,
                    Ok(Err(e)) if e.is_cancellation() => return,
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Session fetch failed, treating as unauthenticated");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("Session fetch timed out, treating as unauthenticated");
                        None
                    }
                }
            }
        };

        let profile = match &session {
            Some(s) => {
                match resolve_profile(&self.directory, s.user_id(), self.fetch_timeout, &self.cancel)
                    .await
                {
                    ProfileFetch::Resolved(p) => Some(p),
                    ProfileFetch::Superseded => return,
                }
            }
            None => Some(None),
        };

        if self.cancel.is_cancelled() {
            return;
        }
        self.tx.send_modify(|snap| {
            snap.user = session.as_ref().map(|s| s.user.clone());
            snap.session = session;
            if let Some(p) = profile {
                snap.profile = p;
            }
            snap.loading = false;
        });
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    /// The shared credential store instance.
    #[must_use]
    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    /// The shared directory instance.
    #[must_use]
    pub fn directory(&self) -> Arc<dyn Directory> {
        self.directory.clone()
    }

    /// Cancels pending work and the event subscription. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.event_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

// =============================================================================
// Internals
// =============================================================================

/// Outcome of a profile fetch against the cancellation policy.
enum ProfileFetch {
    /// Commit this value (possibly `None` = unauthorized).
    Resolved(Option<Profile>),
    /// The fetch was superseded; keep whatever profile is already
    /// committed and do not touch state.
    Superseded,
}

async fn resolve_profile(
    directory: &Arc<dyn Directory>,
    user_id: Uuid,
    fetch_timeout: Duration,
    cancel: &CancellationToken,
) -> ProfileFetch {
    tokio::select! {
        _ = cancel.cancelled() => ProfileFetch::Superseded,
        result = tokio::time::timeout(fetch_timeout, directory.profile(user_id)) => {
            match result {
                Ok(Ok(profile)) => ProfileFetch::Resolved(profile),
                Ok(Err(e)) if e.is_cancellation() => ProfileFetch::Superseded,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, %user_id, "Profile fetch failed, treating as unauthorized");
                    ProfileFetch::Resolved(None)
                }
                Err(_) => {
                    tracing::warn!(%user_id, "Profile fetch timed out, treating as unauthorized");
                    ProfileFetch::Resolved(None)
                }
            }
        }
    }
}

/// Consumes store events until cancelled or the store goes away.
///
/// Only the sign-in / refresh / sign-out transitions touch state; other
/// events are ignored so a noisy store cannot trigger duplicate refresh
/// loops.
async fn run_event_loop(
    store: Arc<dyn CredentialStore>,
    directory: Arc<dyn Directory>,
    fetch_timeout: Duration,
    tx: watch::Sender<AuthSnapshot>,
    cancel: CancellationToken,
) {
    let mut events = store.subscribe();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(AuthChange::SignedIn(session)) | Ok(AuthChange::TokenRefreshed(session)) => {
                let profile =
                    resolve_profile(&directory, session.user_id(), fetch_timeout, &cancel).await;
                let profile = match profile {
                    ProfileFetch::Resolved(p) => Some(p),
                    ProfileFetch::Superseded => None,
                };
                if cancel.is_cancelled() {
                    break;
                }
                tx.send_modify(|snap| {
                    snap.user = Some(session.user.clone());
                    snap.session = Some(session);
                    if let Some(p) = profile {
                        snap.profile = p;
                    }
                    snap.loading = false;
                });
            }
            Ok(AuthChange::SignedOut) => {
                tx.send_modify(|snap| {
                    snap.session = None;
                    snap.user = None;
                    snap.profile = None;
                    snap.loading = false;
                });
            }
            Ok(_) => {
                // Events outside the reacted-to set are ignored.
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Auth event subscription lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
