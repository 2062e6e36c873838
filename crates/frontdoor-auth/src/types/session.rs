//! Per-session authentication state.
//!
//! A browser session is either absent from the store (no session), waiting
//! for the authorization server to redirect back ([`SessionAuthState::Pending`]),
//! or logged in ([`SessionAuthState::Authenticated`]). Because the two live
//! states are enum variants, a session can never hold a pending login and
//! tokens at the same time.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::oauth::pkce::PkceParams;
use crate::oauth::token::TokenResponse;

// =============================================================================
// Session Id
// =============================================================================

/// Opaque session identifier carried in the session cookie.
///
/// 256 random bits, base64url encoded (43 characters).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    const ENCODED_LEN: usize = 43;

    /// Generates a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accepts a cookie value if it has the shape of a generated id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == Self::ENCODED_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(value.to_string()))
    }

    /// The full id, for the cookie value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix that is safe to log.
    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.log_id())
    }
}

// =============================================================================
// Authenticated Session
// =============================================================================

/// Tokens and identity of a logged-in session.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    /// Access token.
    pub access_token: String,

    /// Token type, `Bearer` or `DPoP`.
    pub token_type: String,

    /// Lifetime in seconds from `issued_at`. `None` never expires.
    pub expires_in: Option<u64>,

    /// Refresh token, kept for completeness (never used to refresh).
    pub refresh_token: Option<String>,

    /// Granted scopes.
    pub scope: Option<String>,

    /// OpenID Connect ID token.
    pub id_token: Option<String>,

    /// Display name of the user.
    pub username: String,

    /// When the tokens were received.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl AuthenticatedSession {
    /// Builds the session from a token response received at `issued_at`.
    #[must_use]
    pub fn from_token(token: TokenResponse, username: String, issued_at: OffsetDateTime) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
            scope: token.scope,
            id_token: token.id_token,
            username,
            issued_at,
        }
    }

    /// When the access token stops being valid, if it expires at all.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.issued_at.checked_add(Duration::seconds(secs))
    }

    /// Returns `true` if the token is expired at `now`.
    ///
    /// The token is still valid at exactly `issued_at + expires_in`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_in {
            None => false,
            Some(_) => self.expires_at().is_some_and(|expires_at| now > expires_at),
        }
    }

    /// Returns `true` if the token is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}

impl fmt::Debug for AuthenticatedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedSession")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Session Auth State
// =============================================================================

/// Authentication state stored for one session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionAuthState {
    /// Login started; waiting for the authorization server callback.
    Pending {
        /// Expected `state` parameter.
        oauth_state: String,
        /// PKCE verifier to present at the token endpoint.
        code_verifier: String,
        /// When the login started.
        #[serde(with = "time::serde::rfc3339")]
        started_at: OffsetDateTime,
    },

    /// Logged in.
    Authenticated(AuthenticatedSession),
}

impl SessionAuthState {
    /// Creates a pending state for a login that starts now.
    #[must_use]
    pub fn pending(pkce: &PkceParams, started_at: OffsetDateTime) -> Self {
        Self::Pending {
            oauth_state: pkce.state.clone(),
            code_verifier: pkce.code_verifier.as_str().to_string(),
            started_at,
        }
    }

    /// Returns `true` if a login is in progress.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// The logged-in session, if any.
    #[must_use]
    pub fn as_authenticated(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Pending { .. } => None,
        }
    }
}

impl fmt::Debug for SessionAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending { started_at, .. } => f
                .debug_struct("Pending")
                .field("started_at", started_at)
                .finish_non_exhaustive(),
            Self::Authenticated(session) => f.debug_tuple("Authenticated").field(session).finish(),
        }
    }
}
