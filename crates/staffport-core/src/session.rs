//! Session type and token generation.
//!
//! A [`Session`] represents one authenticated browser/device login. The
//! credential store owns the authoritative copy; everything else holds a
//! read-only projection. Tokens are opaque to the portal - they are
//! generated, refreshed, and invalidated by the store.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::identity::Identity;

/// How close to expiry a session may get before the store refreshes it
/// transparently on the next access.
pub const REFRESH_WINDOW: Duration = Duration::minutes(5);

/// One authenticated login.
///
/// Created on successful credential exchange, refreshed transparently by
/// the credential store when near expiry, destroyed on explicit sign-out
/// or expiry without refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque access token presented on requests.
    pub access_token: String,

    /// Opaque refresh token used to mint a replacement session.
    pub refresh_token: String,

    /// Timestamp the access token stops being valid.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// The identity this session belongs to.
    pub user: Identity,
}

impl Session {
    /// Creates a fresh session for `user` with newly generated token
    /// material, valid for `lifetime`.
    #[must_use]
    pub fn issue(user: Identity, lifetime: Duration) -> Self {
        Self {
            access_token: generate_token(),
            refresh_token: generate_token(),
            expires_at: OffsetDateTime::now_utc() + lifetime,
            user,
        }
    }

    /// Returns `true` if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if the session is inside the transparent-refresh
    /// window (close enough to expiry that the store should rotate it).
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at - REFRESH_WINDOW
    }

    /// Identity id shortcut.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

/// Generates an opaque session token: 256 bits of CSPRNG output,
/// base64url-encoded without padding (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
