//! OpenID Connect userinfo lookup.
//!
//! Only used to find a display name for the freshly authenticated user; a
//! failure here never fails the login.

use serde::Deserialize;
use url::Url;

use super::token::TokenResponse;
use crate::AuthResult;
use crate::dpop::{DPOP_HEADER, DpopProofGenerator};
use crate::error::AuthError;

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    /// Subject identifier.
    #[serde(default)]
    pub sub: Option<String>,

    /// Preferred username.
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// Email address.
    #[serde(default)]
    pub email: Option<String>,

    /// Full name.
    #[serde(default)]
    pub name: Option<String>,
}

impl UserInfo {
    /// The best available username: `preferred_username`, then `email`, then
    /// `sub`. Blank values are skipped.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        [&self.preferred_username, &self.email, &self.sub]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.trim().is_empty())
    }
}

/// Client for the userinfo endpoint.
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    endpoint: Url,
    http: reqwest::Client,
    dpop: Option<DpopProofGenerator>,
}

impl UserInfoClient {
    /// Creates a userinfo client.
    #[must_use]
    pub fn new(endpoint: Url, http: reqwest::Client, dpop: Option<DpopProofGenerator>) -> Self {
        Self {
            endpoint,
            http,
            dpop,
        }
    }

    /// Fetches the claims of the token's subject.
    ///
    /// DPoP-bound tokens are presented with the `DPoP` scheme and a proof
    /// carrying the token hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserInfo` on transport errors, non-2xx responses
    /// or an unparseable body, and `AuthError::Signing` if a proof cannot be
    /// created.
    pub async fn fetch(&self, token: &TokenResponse) -> AuthResult<UserInfo> {
        let scheme = if token.is_dpop_bound() { "DPoP" } else { "Bearer" };

        let mut request = self
            .http
            .get(self.endpoint.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{scheme} {}", token.access_token),
            );

        if token.is_dpop_bound() {
            if let Some(dpop) = &self.dpop {
                let proof = dpop.generate("GET", &self.endpoint, Some(&token.access_token))?;
                request = request.header(DPOP_HEADER, proof);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::user_info(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::user_info(format!("HTTP {status}")));
        }

        response
            .json::<UserInfo>()
            .await
            .map_err(|e| AuthError::user_info(format!("failed to parse response: {e}")))
    }
}
