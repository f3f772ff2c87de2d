use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

use staffport_auth::{GateDecision, RouteClass, TokenResolution};
use staffport_core::Session;

use crate::state::AppState;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "sp-access-token";

/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "sp-refresh-token";

// =============================================================================
// Edge Gatekeeper
// =============================================================================

/// Gatekeeper middleware running on every inbound request that is not a
/// static asset.
///
/// 1. Resolves (and possibly refreshes) the session from request cookies
/// 2. Evaluates the route decision table
/// 3. Propagates any refreshed token material onto the outgoing response;
///    skipping that would silently kill the session on the next
///    navigation
/// 4. On a role denial, forces the session out before redirecting
///
/// Fails closed: any store error during user or profile resolution is
/// treated as "no user" and ends in a login redirect, never a
/// pass-through.
pub async fn gatekeeper(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if state.gate.is_exempt(&path) {
        return next.run(req).await;
    }

    let jar = CookieJar::from_headers(req.headers());
    let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let resolution = if access.is_some() || refresh.is_some() {
        match state
            .store
            .resolve_tokens(access.as_deref(), refresh.as_deref())
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(error = %e, %path, "Session resolution failed, treating as unauthenticated");
                None
            }
        }
    } else {
        None
    };
    let user = resolution.as_ref().map(|r| r.user.clone());

    // The profile is only consulted on protected paths with a resolved
    // user; a fetch error drops the user entirely (fail closed).
    let mut profile = None;
    if state.gate.classify(&path) == RouteClass::Protected {
        if let Some(user) = &user {
            match state.directory.profile(user.id).await {
                Ok(row) => profile = row,
                Err(e) => {
                    tracing::warn!(error = %e, user_id = %user.id, "Profile resolution failed, treating as unauthenticated");
                    let response =
                        Redirect::temporary(&state.gate.login_path).into_response();
                    return with_refreshed_cookies(response, resolution.as_ref());
                }
            }
        }
    }

    match state.gate.decide(&path, user.is_some(), profile.as_ref()) {
        GateDecision::PassThrough => {
            let response = next.run(req).await;
            with_refreshed_cookies(response, resolution.as_ref())
        }
        GateDecision::Redirect { location } => {
            let response = Redirect::temporary(&location).into_response();
            with_refreshed_cookies(response, resolution.as_ref())
        }
        GateDecision::DenyAndSignOut { location } => {
            // Prefer the rotated token when a refresh happened during
            // resolution; the cookie's token is already dead then.
            let live_token = resolution
                .as_ref()
                .and_then(|r| r.refreshed.as_ref())
                .map(|s| s.access_token.clone())
                .or(access);
            if let Some(token) = live_token {
                if let Err(e) = state.store.revoke(&token).await {
                    tracing::warn!(error = %e, "Forced sign-out failed");
                }
            }
            tracing::info!(%path, "Access denied, session signed out");
            clear_session_cookies(Redirect::temporary(&location).into_response())
        }
    }
}

/// Re-sets the session cookies when resolution rotated the tokens.
fn with_refreshed_cookies(response: Response, resolution: Option<&TokenResolution>) -> Response {
    match resolution.and_then(|r| r.refreshed.as_ref()) {
        Some(session) => (session_cookie_jar(session), response).into_response(),
        None => response,
    }
}

/// Cookie jar carrying a session's token material.
pub fn session_cookie_jar(session: &Session) -> CookieJar {
    CookieJar::new()
        .add(session_cookie(ACCESS_COOKIE, session.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, session.refresh_token.clone()))
}

/// Adds removal cookies for both session cookies to a response.
pub fn clear_session_cookies(response: Response) -> Response {
    let jar = CookieJar::new()
        .remove(Cookie::build((ACCESS_COOKIE, "")).path("/").build())
        .remove(Cookie::build((REFRESH_COOKIE, "")).path("/").build());
    (jar, response).into_response()
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

// =============================================================================
// Other Middleware
// =============================================================================

/// Gives every request an `x-request-id`, preserving one supplied by the
/// caller, and echoes it on the response. The value also lands in request
/// extensions so handlers can tag their logs with it.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let id = req.headers().get(&header_name).cloned().unwrap_or_else(|| {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    });

    req.extensions_mut().insert(id.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert(header_name, id);
    response
}
