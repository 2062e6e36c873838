//! Authorization request URL construction.

use url::Url;

use super::pkce::PkceParams;
use crate::config::ClientConfig;

/// Builds the URL the user agent is redirected to at the start of a login.
///
/// The endpoint itself is validated when [`ClientConfig`] is built, so
/// building the URL cannot fail.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlBuilder {
    endpoint: Url,
    client_id: String,
    redirect_uri: String,
    scope: String,
}

impl AuthorizationUrlBuilder {
    /// Creates a builder for the configured client.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.authorization_uri().clone(),
            client_id: config.client_id().to_string(),
            redirect_uri: config.redirect_uri().to_string(),
            scope: config.scope().to_string(),
        }
    }

    /// Appends the authorization request parameters to the endpoint.
    ///
    /// Any query already present on the endpoint is preserved.
    #[must_use]
    pub fn build(&self, pkce: &PkceParams) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &self.client_id);
            params.append_pair("response_type", "code");
            params.append_pair("redirect_uri", &self.redirect_uri);
            params.append_pair("scope", &self.scope);
            params.append_pair("state", &pkce.state);
            params.append_pair("code_challenge", pkce.code_challenge.as_str());
            params.append_pair("code_challenge_method", pkce.method.as_str());
        }

        tracing::debug!(
            endpoint = %self.endpoint.as_str().split('?').next().unwrap_or(""),
            "Built authorization URL"
        );

        url
    }
}
