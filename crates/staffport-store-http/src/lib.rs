//! # staffport-store-http
//!
//! [`CredentialStore`] and [`Directory`] backed by the external identity
//! and data service over HTTP.
//!
//! The service exposes a token endpoint (`/auth/v1/token`), a verified
//! user endpoint (`/auth/v1/user`), a logout endpoint (`/auth/v1/logout`),
//! and a row-query surface under `/rest/v1/` supporting equality filters,
//! inner-join filters on a related table, and ordering. Every request
//! carries the public API key; authenticated calls add a bearer token.
//!
//! Token material is opaque here. The store cannot see an expiry inside a
//! raw access token, so edge resolution refreshes reactively: a token the
//! user endpoint rejects is retried through the refresh grant, and the
//! rotated session is reported back so the caller can re-set its cookies.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use staffport_auth::{AuthChange, AuthError, AuthResult, CredentialStore, Directory, TokenResolution};
use staffport_core::{Client, Identity, Profile, Session};

const EVENT_CAPACITY: usize = 16;

/// HTTP credential store and directory.
pub struct HttpStore {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    /// Session this process signed in with (the "current" session).
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl HttpStore {
    /// Creates a store against `base_url` using the given public API key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is not a valid URL or
    /// the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: &str) -> AuthResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AuthError::configuration(format!("invalid backend url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::configuration(format!("http client: {e}")))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            session: RwLock::new(None),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::configuration(format!("invalid endpoint path {path}: {e}")))
    }

    fn emit(&self, event: AuthChange) {
        let _ = self.events.send(event);
    }

    fn cached_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Runs a token-endpoint grant and converts the response.
    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> AuthResult<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let token: TokenResponse =
                    response.json().await.map_err(map_transport_error)?;
                Ok(token.into_session())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::unauthorized("Invalid login credentials"))
            }
            status => Err(AuthError::storage(format!(
                "token endpoint returned {status}"
            ))),
        }
    }

    /// Verifies an access token against the user endpoint.
    ///
    /// `Ok(None)` means the token is dead (expired, revoked, garbage);
    /// transport and server failures are errors.
    async fn fetch_user(&self, access_token: &str) -> AuthResult<Option<Identity>> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let user: RemoteUser = response.json().await.map_err(map_transport_error)?;
                Ok(Some(user.into_identity()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(AuthError::storage(format!(
                "user endpoint returned {status}"
            ))),
        }
    }

    async fn refresh_grant(&self, refresh_token: &str) -> AuthResult<Session> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn post_logout(&self, access_token: &str) -> AuthResult<()> {
        let url = self.endpoint("auth/v1/logout")?;
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_transport_error)?;
        // An already-dead token is fine; only server breakage is an error.
        if response.status().is_server_error() {
            return Err(AuthError::storage(format!(
                "logout endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for HttpStore {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let Some(session) = self.cached_session() else {
            return Ok(None);
        };
        if !session.needs_refresh() {
            return Ok(Some(session));
        }
        match self.refresh_grant(&session.refresh_token).await {
            Ok(refreshed) => {
                self.cache_session(Some(refreshed.clone()));
                self.emit(AuthChange::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(AuthError::Unauthorized { .. }) => {
                // Refresh rejected: the session is gone.
                self.cache_session(None);
                self.emit(AuthChange::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> AuthResult<Option<Identity>> {
        let Some(session) = self.cached_session() else {
            return Ok(None);
        };
        self.fetch_user(&session.access_token).await
    }

    async fn resolve_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<Option<TokenResolution>> {
        if let Some(token) = access_token {
            if let Some(user) = self.fetch_user(token).await? {
                return Ok(Some(TokenResolution {
                    user,
                    refreshed: None,
                }));
            }
        }
        let Some(refresh) = refresh_token else {
            return Ok(None);
        };
        match self.refresh_grant(refresh).await {
            Ok(session) => {
                self.emit(AuthChange::TokenRefreshed(session.clone()));
                Ok(Some(TokenResolution {
                    user: session.user.clone(),
                    refreshed: Some(session),
                }))
            }
            Err(AuthError::Unauthorized { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self
            .token_grant(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        self.cache_session(Some(session.clone()));
        self.emit(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.cached_session() else {
            return Ok(());
        };
        let result = self.post_logout(&session.access_token).await;
        // Local state clears regardless; a failed remote logout must not
        // leave the portal looking signed in.
        self.cache_session(None);
        self.emit(AuthChange::SignedOut);
        result
    }

    async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let result = self.post_logout(access_token).await;
        let was_current = self
            .cached_session()
            .is_some_and(|s| s.access_token == access_token);
        if was_current {
            self.cache_session(None);
        }
        self.emit(AuthChange::SignedOut);
        result
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Directory for HttpStore {
    async fn profile(&self, user_id: Uuid) -> AuthResult<Option<Profile>> {
        let mut url = self.endpoint("rest/v1/user_profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{user_id}"))
            .append_pair("select", "*");

        let response = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(AuthError::storage(format!(
                "profile query returned {}",
                response.status()
            )));
        }
        let mut rows: Vec<Profile> = response.json().await.map_err(map_transport_error)?;
        // A single-row fetch by primary key; an empty set is "no row".
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn assigned_clients(&self, employee_id: Uuid) -> AuthResult<Vec<Client>> {
        let mut url = self.endpoint("rest/v1/clients")?;
        url.query_pairs_mut()
            // Inner join: clients without a matching assignment row drop out.
            .append_pair("select", "*,client_assignments!inner(employee_id,is_active)")
            .append_pair("client_assignments.employee_id", &format!("eq.{employee_id}"))
            .append_pair("client_assignments.is_active", "eq.true")
            .append_pair("order", "name.asc");

        let response = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(AuthError::storage(format!(
                "clients query returned {}",
                response.status()
            )));
        }
        let clients: Vec<Client> = response.json().await.map_err(map_transport_error)?;
        Ok(clients)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: RemoteUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: OffsetDateTime::now_utc() + Duration::seconds(self.expires_in),
            user: self.user.into_identity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: Uuid,
    email: String,
}

impl RemoteUser {
    fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_body(user_id: Uuid) -> serde_json::Value {
        json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600,
            "user": { "id": user_id, "email": "ana@example.com" }
        })
    }

    #[tokio::test]
    async fn test_sign_in_with_password() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(user_id)))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let session = store
            .sign_in_with_password("ana@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(session.user.id, user_id);
        assert_eq!(session.access_token, "at-1");
        assert!(store.cached_session().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let err = store
            .sign_in_with_password("ana@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_resolve_tokens_via_user_endpoint() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(bearer_token("at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id,
                "email": "ana@example.com"
            })))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let resolution = store
            .resolve_tokens(Some("at-1"), None)
            .await
            .unwrap()
            .expect("token should resolve");
        assert_eq!(resolution.user.id, user_id);
        assert!(resolution.refreshed.is_none());
    }

    #[tokio::test]
    async fn test_resolve_tokens_falls_back_to_refresh_grant() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(user_id)))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let resolution = store
            .resolve_tokens(Some("stale"), Some("rt-0"))
            .await
            .unwrap()
            .expect("refresh should resolve");
        assert_eq!(resolution.user.id, user_id);
        let refreshed = resolution.refreshed.expect("session should rotate");
        assert_eq!(refreshed.access_token, "at-1");
    }

    #[tokio::test]
    async fn test_resolve_tokens_dead_tokens_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        assert!(
            store
                .resolve_tokens(Some("dead"), Some("dead"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_profile_query_row_and_absence() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_profiles"))
            .and(query_param("id", format!("eq.{user_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": user_id,
                "display_name": "Ana",
                "role": "manager"
            }])))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let profile = store.profile(user_id).await.unwrap().expect("row exists");
        assert_eq!(profile.display_name, "Ana");
        assert!(profile.grants_portal_access());
    }

    #[tokio::test]
    async fn test_profile_missing_row_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        assert!(store.profile(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assigned_clients_query_shape() {
        let server = MockServer::start().await;
        let employee_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/rest/v1/clients"))
            .and(query_param(
                "client_assignments.employee_id",
                format!("eq.{employee_id}"),
            ))
            .and(query_param("client_assignments.is_active", "eq.true"))
            .and(query_param("order", "name.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": Uuid::new_v4(),
                    "name": "A1 Widgets",
                    "contact_email": "a1@example.com",
                    "client_assignments": [{ "employee_id": employee_id, "is_active": true }]
                },
                {
                    "id": Uuid::new_v4(),
                    "name": "A2 Gadgets",
                    "contact_email": "a2@example.com",
                    "client_assignments": [{ "employee_id": employee_id, "is_active": true }]
                }
            ])))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), "anon-key").unwrap();
        let clients = store.assigned_clients(employee_id).await.unwrap();
        let names: Vec<&str> = clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A1 Widgets", "A2 Gadgets"]);
    }
}
