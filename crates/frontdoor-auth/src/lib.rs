//! # frontdoor-auth
//!
//! OAuth 2.0 relying party for browser sessions.
//!
//! This crate provides:
//! - Authorization code flow with PKCE (S256) and CSRF `state`
//! - DPoP (RFC 9449) proof generation with file-backed or ephemeral RSA keys
//! - Per-session authentication state with idle expiry
//! - An axum middleware that gates routes behind a logged-in session
//!
//! ## Modules
//!
//! - [`config`] - OAuth client, DPoP, session and filter settings
//! - [`oauth`] - PKCE, authorization URL, token exchange and the login flow
//! - [`dpop`] - key management and proof JWTs
//! - [`types`] - session ids and session state
//! - [`storage`] - session store trait and in-memory store
//! - [`middleware`] - session filter and principal extractor

pub mod config;
pub mod dpop;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod storage;
pub mod types;

pub use config::{
    ClientConfig, ConfigError, DpopSettings, FilterSettings, OAuthClientSettings, SessionSettings,
};
pub use dpop::{DpopKeyManager, DpopProofGenerator, KeyLoadError, KeyOrigin};
pub use error::{AuthError, ErrorCategory};
pub use middleware::{
    AuthFilterState, AuthenticatedPrincipal, Principal, PublicPaths, SessionCookie,
    session_auth_filter,
};
pub use oauth::{CallbackParams, OAuthFlow, PkceParams, TokenResponse};
pub use storage::{InMemorySessionStore, SessionStore};
pub use types::{AuthenticatedSession, SessionAuthState, SessionId};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use frontdoor_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{
        ClientConfig, ConfigError, DpopSettings, FilterSettings, OAuthClientSettings,
        SessionSettings,
    };
    pub use crate::dpop::{DpopKeyManager, DpopProofGenerator};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{
        AuthFilterState, AuthenticatedPrincipal, LOGIN_PATH, Principal, PublicPaths,
        SessionCookie, found, session_auth_filter,
    };
    pub use crate::oauth::{CallbackParams, OAuthFlow};
    pub use crate::storage::{InMemorySessionStore, SessionLocks, SessionStore};
    pub use crate::types::{SessionAuthState, SessionId};
}
