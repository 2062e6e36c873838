//! Authorization code exchange at the token endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::config::ClientConfig;
use crate::dpop::{DPOP_HEADER, DpopProofGenerator};
use crate::error::AuthError;

/// Longest slice of an error body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 1024;

/// Builds the HTTP client used for calls to the authorization server.
///
/// # Errors
///
/// Returns `AuthError::Configuration` if the TLS backend cannot be
/// initialized.
pub fn build_http_client(timeout: Duration) -> AuthResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::configuration(format!("failed to create HTTP client: {e}")))
}

// =============================================================================
// Token Response
// =============================================================================

/// Successful token endpoint response (RFC 6749 Section 5.1).
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Token type, `Bearer` or `DPoP`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds. Absent means no expiry information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Any other members of the response, passed through untouched.
    #[serde(flatten)]
    pub custom_parameters: serde_json::Map<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Returns `true` if the token is bound to our DPoP key.
    #[must_use]
    pub fn is_dpop_bound(&self) -> bool {
        self.token_type.eq_ignore_ascii_case("DPoP")
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "custom_parameters",
                &self.custom_parameters.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Error body returned by the token endpoint (RFC 6749 Section 5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

// =============================================================================
// Token Client
// =============================================================================

/// Performs the `authorization_code` grant.
#[derive(Debug, Clone)]
pub struct TokenClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    dpop: Option<DpopProofGenerator>,
}

impl TokenClient {
    /// Creates a token client. Pass a proof generator to send DPoP proofs.
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        http: reqwest::Client,
        dpop: Option<DpopProofGenerator>,
    ) -> Self {
        Self { config, http, dpop }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// The code is used exactly once; failures are not retried.
    ///
    /// # Errors
    ///
    /// - `AuthError::MissingPkceVerifier` if `code_verifier` is empty; no
    ///   request is made in that case.
    /// - `AuthError::Signing` if the DPoP proof cannot be created.
    /// - `AuthError::TokenExchange` for transport errors, timeouts, non-2xx
    ///   responses and unparseable bodies.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenResponse> {
        if code_verifier.is_empty() {
            return Err(AuthError::MissingPkceVerifier);
        }

        let token_uri = self.config.token_uri();
        let redirect_uri = self.config.redirect_uri();

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id()),
        ];
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }
        params.push(("redirect_uri", redirect_uri));
        params.push(("code_verifier", code_verifier));

        let mut request = self
            .http
            .post(token_uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params);

        if let Some(dpop) = &self.dpop {
            let proof = dpop.generate("POST", token_uri, None)?;
            request = request.header(DPOP_HEADER, proof);
        }

        tracing::debug!(
            token_uri = %token_uri,
            dpop = self.dpop.is_some(),
            "Exchanging authorization code"
        );

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::token_exchange(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OAuthErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("HTTP {status}: {}: {description}", err.error),
                    None => format!("HTTP {status}: {}", err.error),
                },
                Err(_) => format!("HTTP {status}"),
            };
            return Err(AuthError::token_exchange_response(
                status.as_u16(),
                truncate(&body),
                message,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::token_exchange(describe_transport_error(&e)))?;

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::token_exchange_response(
                status.as_u16(),
                truncate(&body),
                format!("failed to parse token response: {e}"),
            )
        })?;

        tracing::debug!(
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            "Token exchange succeeded"
        );

        Ok(token)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request to token endpoint timed out".to_string()
    } else if err.is_connect() {
        format!("could not connect to token endpoint: {err}")
    } else {
        format!("request to token endpoint failed: {err}")
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_DIAGNOSTIC_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
