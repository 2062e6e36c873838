//! Request-scoped authentication types.

use std::fmt;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::Response,
};

use super::filter::{LOGIN_PATH, found};
use crate::types::session::AuthenticatedSession;

/// The logged-in user of the current request.
///
/// Inserted into request extensions by the session filter.
#[derive(Clone)]
pub struct AuthenticatedPrincipal {
    /// Display name of the user.
    pub username: String,

    /// Access token to call resource servers with.
    pub access_token: String,

    /// Token type, `Bearer` or `DPoP`.
    pub token_type: String,
}

impl AuthenticatedPrincipal {
    /// Builds the principal from a stored session.
    #[must_use]
    pub fn from_session(session: &AuthenticatedSession) -> Self {
        Self {
            username: session.username.clone(),
            access_token: session.access_token.clone(),
            token_type: session.token_type.clone(),
        }
    }

    /// Returns `true` if the token must be presented with a DPoP proof.
    #[must_use]
    pub fn is_dpop_bound(&self) -> bool {
        self.token_type.eq_ignore_ascii_case("DPoP")
    }

    /// Value of the `Authorization` header for calls made on the user's
    /// behalf.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        let scheme = if self.is_dpop_bound() { "DPoP" } else { "Bearer" };
        format!("{scheme} {}", self.access_token)
    }
}

impl fmt::Debug for AuthenticatedPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedPrincipal")
            .field("username", &self.username)
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Axum extractor for the authenticated principal.
///
/// Requires the session filter to run first; without a principal in the
/// request the user agent is redirected to the login page.
///
/// # Example
///
/// ```ignore
/// async fn home(Principal(user): Principal) -> String {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct Principal(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedPrincipal>()
            .cloned()
            .map(Principal)
            .ok_or_else(|| found(LOGIN_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn principal(token_type: &str) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal::from_session(&AuthenticatedSession {
            access_token: "secret-token".to_string(),
            token_type: token_type.to_string(),
            expires_in: None,
            refresh_token: None,
            scope: None,
            id_token: None,
            username: "alice".to_string(),
            issued_at: OffsetDateTime::now_utc(),
        })
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", principal("Bearer"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(
            principal("bearer").authorization_header(),
            "Bearer secret-token"
        );
        let dpop = principal("DPoP");
        assert!(dpop.is_dpop_bound());
        assert_eq!(dpop.authorization_header(), "DPoP secret-token");
    }
}
