//! HTTP handlers: the login surface and the protected dashboard surface.
//!
//! The dashboard handlers re-check authorization against the session
//! context before rendering, as defense-in-depth behind the edge
//! gatekeeper. Both enforcement points go through the same role
//! predicate, so the rules cannot diverge.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, body::Body};
use serde::Deserialize;

use staffport_auth::{AuthSnapshot, ClientsView};

use crate::middleware::{clear_session_cookies, session_cookie_jar};
use crate::state::AppState;

// =============================================================================
// Render gate (protected surface)
// =============================================================================

/// What the protected surface should do for the current auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderGate {
    /// Initial resolution still in flight: neutral loading indicator,
    /// no content, no redirect.
    Loading,
    /// Unauthenticated or unauthorized: redirect to login and render a
    /// neutral placeholder, never the protected content.
    RedirectLogin,
    /// Authenticated and authorized: render the protected content.
    Render,
}

/// Pure decision for the dashboard's client-side check. Safe to evaluate
/// repeatedly; redirecting twice lands on the same target.
#[must_use]
pub fn render_gate(snapshot: &AuthSnapshot) -> RenderGate {
    if snapshot.loading {
        RenderGate::Loading
    } else if snapshot.is_staff() {
        RenderGate::Render
    } else {
        RenderGate::RedirectLogin
    }
}

// =============================================================================
// Protected surface
// =============================================================================

pub async fn dashboard(State(state): State<AppState>) -> Response {
    let snapshot = state.ctx.snapshot();
    match render_gate(&snapshot) {
        RenderGate::Loading => loading_page(),
        RenderGate::RedirectLogin => redirect_login(&state),
        RenderGate::Render => {
            let view = state.resolver.resolve(snapshot.user.as_ref()).await;
            let name = snapshot
                .profile
                .as_ref()
                .map(|p| p.display_name.as_str())
                .unwrap_or("there");
            Html(format!(
                "<!doctype html><title>Dashboard</title>\
                 <h1>Welcome, {}</h1>\
                 <p>{}</p>\
                 <nav><a href=\"/dashboard/clients\">Clients</a> \
                 <form method=\"post\" action=\"/logout\"><button>Sign out</button></form></nav>",
                escape_html(name),
                client_count_line(&view),
            ))
            .into_response()
        }
    }
}

pub async fn dashboard_clients(State(state): State<AppState>) -> Response {
    let snapshot = state.ctx.snapshot();
    match render_gate(&snapshot) {
        RenderGate::Loading => loading_page(),
        RenderGate::RedirectLogin => redirect_login(&state),
        RenderGate::Render => {
            let view = state.resolver.resolve(snapshot.user.as_ref()).await;
            let rows: String = view
                .clients
                .iter()
                .map(|c| {
                    format!(
                        "<li>{} &lt;{}&gt;</li>",
                        escape_html(&c.name),
                        escape_html(&c.contact_email)
                    )
                })
                .collect();
            Html(format!(
                "<!doctype html><title>Assigned clients</title>\
                 <h1>Assigned clients</h1><ul>{rows}</ul>\
                 <p><a href=\"/dashboard\">Back</a></p>"
            ))
            .into_response()
        }
    }
}

fn client_count_line(view: &ClientsView) -> String {
    if view.loading {
        "Loading assigned clients...".to_string()
    } else {
        format!("{} assigned client(s).", view.clients.len())
    }
}

fn loading_page() -> Response {
    Html("<!doctype html><title>Loading</title><p>Loading...</p>").into_response()
}

fn redirect_login(state: &AppState) -> Response {
    // Idempotent: every evaluation produces the same redirect.
    Redirect::temporary(&state.gate.login_path).into_response()
}

// =============================================================================
// Login surface
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub message: Option<String>,
}

pub async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    let notice = query
        .message
        .as_deref()
        .map(|m| format!("<p role=\"alert\">{}</p>", escape_html(m)))
        .unwrap_or_default();
    Html(format!(
        "<!doctype html><title>Sign in</title><h1>Employee portal</h1>{notice}\
         <form method=\"post\" action=\"/login\">\
         <input name=\"email\" type=\"email\" placeholder=\"Email\" required>\
         <input name=\"password\" type=\"password\" placeholder=\"Password\" required>\
         <button>Sign in</button></form>"
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state
        .store
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(session) => {
            let jar = session_cookie_jar(&session);
            (jar, Redirect::to(&state.gate.protected_prefix)).into_response()
        }
        Err(e) => {
            if !matches!(e, staffport_auth::AuthError::Unauthorized { .. }) {
                tracing::error!(error = %e, "Sign-in failed");
            }
            let location = format!("{}?message=Invalid+login+credentials", state.gate.login_path);
            Redirect::to(&location).into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>) -> Response {
    if let Err(e) = state.store.sign_out().await {
        tracing::warn!(error = %e, "Sign-out reported an error");
    }
    clear_session_cookies(Redirect::to(&state.gate.login_path).into_response())
}

// =============================================================================
// Miscellaneous
// =============================================================================

pub async fn healthz() -> &'static str {
    "ok"
}

/// Error boundary for the protected content area: a panic in a child view
/// becomes a generic recoverable page with a retry action instead of a
/// dead connection.
pub fn recoverable_error(err: Box<dyn std::any::Any + Send + 'static>) -> Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Protected view panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(
            "<!doctype html><title>Something went wrong</title>\
             <h1>Something went wrong</h1>\
             <p>The page hit an unexpected error. Your session is unaffected.</p>\
             <p><a href=\"/dashboard\">Try again</a></p>",
        ),
    )
        .into_response()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffport_core::{Identity, Profile, Role};
    use uuid::Uuid;

    fn snapshot(loading: bool, role: Option<Role>) -> AuthSnapshot {
        let id = Uuid::new_v4();
        AuthSnapshot {
            session: None,
            user: role.as_ref().map(|_| Identity {
                id,
                email: "staff@example.com".to_string(),
            }),
            profile: role.map(|role| Profile {
                id,
                display_name: "Staff".to_string(),
                role,
                created_at: None,
            }),
            loading,
        }
    }

    #[test]
    fn test_loading_renders_neutral_state() {
        assert_eq!(render_gate(&snapshot(true, None)), RenderGate::Loading);
        // Loading wins even when a profile is already present.
        assert_eq!(
            render_gate(&snapshot(true, Some(Role::Employee))),
            RenderGate::Loading
        );
    }

    #[test]
    fn test_unauthorized_redirects() {
        assert_eq!(render_gate(&snapshot(false, None)), RenderGate::RedirectLogin);
        assert_eq!(
            render_gate(&snapshot(false, Some(Role::Other("client".to_string())))),
            RenderGate::RedirectLogin
        );
    }

    #[test]
    fn test_authorized_renders() {
        for role in [Role::Employee, Role::Manager, Role::Admin] {
            assert_eq!(render_gate(&snapshot(false, Some(role))), RenderGate::Render);
        }
    }

    #[test]
    fn test_render_gate_is_idempotent() {
        let snap = snapshot(false, None);
        assert_eq!(render_gate(&snap), render_gate(&snap));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>\"&'"),
            "&lt;script&gt;&quot;&amp;&#39;"
        );
    }

    #[tokio::test]
    async fn test_panicking_view_becomes_recoverable_page() {
        use axum::http::{Request, StatusCode};
        use axum::routing::get;
        use tower::ServiceExt;
        use tower_http::catch_panic::CatchPanicLayer;

        async fn exploding_view() -> Html<&'static str> {
            panic!("child view blew up");
        }

        let app = axum::Router::new()
            .route("/dashboard/broken", get(exploding_view))
            .layer(CatchPanicLayer::custom(recoverable_error));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/dashboard/broken")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        // A generic recoverable page with a retry action, not the panic text.
        assert!(page.contains("Something went wrong"));
        assert!(page.contains("Try again"));
        assert!(!page.contains("child view blew up"));
    }
}
