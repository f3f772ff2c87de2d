//! Router assembly.

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Builds the application router.
///
/// The gatekeeper wraps the whole router (including the fallback, so the
/// bare root path dispatches without a route). The panic boundary wraps
/// only the protected content area.
pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .route("/dashboard/clients", get(handlers::dashboard_clients))
        .layer(CatchPanicLayer::custom(handlers::recoverable_error));

    Router::new()
        .merge(protected)
        .route(
            "/login",
            get(handlers::login_page).post(handlers::login_submit),
        )
        .route("/logout", post(handlers::logout))
        .route("/healthz", get(handlers::healthz))
        .layer(from_fn_with_state(state.clone(), middleware::gatekeeper))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
