//! Session authentication filter.
//!
//! Runs in front of every route. Requests to public paths pass through;
//! every other request must belong to a session that is logged in with an
//! unexpired token, otherwise the user agent is redirected to the login
//! page.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use frontdoor_auth::middleware::{AuthFilterState, session_auth_filter};
//!
//! let app = Router::new()
//!     .route("/home", get(home))
//!     .layer(middleware::from_fn_with_state(filter_state, session_auth_filter));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::types::AuthenticatedPrincipal;
use crate::oauth::flow::OAuthFlow;
use crate::types::session::SessionId;

/// Path of the login page.
pub const LOGIN_PATH: &str = "/login";

/// Paths that never require authentication.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/", LOGIN_PATH, "/oauth2/authorize", "/oauth2/callback"];

/// `302 Found` redirect.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

// =============================================================================
// Public Paths
// =============================================================================

/// Allow-list of unauthenticated paths.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicPaths {
    /// The login flow endpoints plus `extra` paths. Entries ending in `/*`
    /// match the whole subtree below them.
    #[must_use]
    pub fn new(extra: &[String]) -> Self {
        let mut exact: Vec<String> = DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect();
        let mut prefixes = Vec::new();

        for path in extra {
            match path.strip_suffix('*') {
                Some(prefix) if prefix.ends_with('/') => prefixes.push(prefix.to_string()),
                _ => exact.push(path.clone()),
            }
        }

        Self { exact, prefixes }
    }

    /// Returns `true` if `path` can be served without a login.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path) || self.prefixes.iter().any(|p| path.starts_with(p))
    }
}

impl Default for PublicPaths {
    fn default() -> Self {
        Self::new(&[])
    }
}

// =============================================================================
// Session Cookie
// =============================================================================

/// Session cookie attributes.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
}

impl SessionCookie {
    /// Creates the cookie settings.
    #[must_use]
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the session id from the request cookies. Malformed values are
    /// ignored.
    #[must_use]
    pub fn session_id(&self, jar: &CookieJar) -> Option<SessionId> {
        jar.get(&self.name)
            .and_then(|cookie| SessionId::parse(cookie.value()))
    }

    /// Builds the cookie carrying `id`.
    ///
    /// `SameSite=Lax` so the cookie survives the top-level redirect back from
    /// the authorization server.
    #[must_use]
    pub fn build(&self, id: &SessionId) -> Cookie<'static> {
        Cookie::build((self.name.clone(), id.as_str().to_string()))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .build()
    }

    /// Removes the session cookie from the jar.
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(self.name.clone()).path("/"))
    }
}

// =============================================================================
// Filter
// =============================================================================

/// State of the session filter.
#[derive(Clone)]
pub struct AuthFilterState {
    /// The login flow.
    pub flow: Arc<OAuthFlow>,

    /// Session cookie settings.
    pub cookie: SessionCookie,

    /// Unauthenticated paths.
    pub public_paths: Arc<PublicPaths>,
}

impl AuthFilterState {
    /// Creates the filter state.
    pub fn new(flow: Arc<OAuthFlow>, cookie: SessionCookie, public_paths: PublicPaths) -> Self {
        Self {
            flow,
            cookie,
            public_paths: Arc::new(public_paths),
        }
    }
}

/// Gate for protected routes.
///
/// Public paths pass through. Otherwise a logged-in session's
/// [`AuthenticatedPrincipal`] is put into the request extensions and the
/// request continues; anything else is redirected (302) to the login page.
pub async fn session_auth_filter(
    State(state): State<AuthFilterState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if state.public_paths.is_public(&path) {
        return next.run(req).await;
    }

    let Some(session) = state.cookie.session_id(&jar) else {
        tracing::debug!(path = %path, "No session cookie, redirecting to login");
        return found(LOGIN_PATH);
    };

    match state.flow.authenticate(&session).await {
        Ok(Some(principal)) => {
            tracing::debug!(
                session = %session.log_id(),
                username = %principal.username,
                "Session authenticated"
            );
            req.extensions_mut().insert::<AuthenticatedPrincipal>(principal);
            next.run(req).await
        }
        Ok(None) => {
            tracing::debug!(
                session = %session.log_id(),
                path = %path,
                "Session not authenticated, redirecting to login"
            );
            found(LOGIN_PATH)
        }
        Err(e) => {
            tracing::error!(
                session = %session.log_id(),
                error = %e,
                category = %e.category(),
                "Session lookup failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
