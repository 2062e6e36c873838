//! Relying-party configuration.
//!
//! The `*Settings` types are what gets deserialized from the configuration
//! file and environment. [`ClientConfig`] is the validated, immutable form of
//! [`OAuthClientSettings`] that the rest of the crate works with; building it
//! is the only place configuration errors can arise.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oauth]
//! client_id = "frontdoor"
//! redirect_uri = "http://localhost:8080/oauth2/callback"
//! authorization_uri = "https://idp.example.com/oauth2/authorize"
//! token_uri = "https://idp.example.com/oauth2/token"
//! dpop_enabled = true
//!
//! [session]
//! idle_timeout = "30m"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Errors raised while validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::configuration(err.to_string())
    }
}

// =============================================================================
// OAuth Client Settings
// =============================================================================

/// OAuth 2.0 client registration as read from configuration.
///
/// Empty strings mean "not configured".
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthClientSettings {
    /// Client identifier registered at the authorization server.
    pub client_id: String,

    /// Client secret. Leave empty for a public client.
    pub client_secret: String,

    /// Redirect URI registered for this client (our `/oauth2/callback`).
    pub redirect_uri: String,

    /// Space-separated scopes to request.
    pub scope: String,

    /// Authorization endpoint.
    pub authorization_uri: String,

    /// Token endpoint.
    pub token_uri: String,

    /// Optional userinfo endpoint used to resolve a display name.
    pub userinfo_uri: String,

    /// Send DPoP proofs and request DPoP-bound tokens.
    pub dpop_enabled: bool,

    /// Timeout for calls to the token and userinfo endpoints.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Username used when the provider does not tell us one.
    pub default_username: String,
}

impl Default for OAuthClientSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scope: "openid".to_string(),
            authorization_uri: String::new(),
            token_uri: String::new(),
            userinfo_uri: String::new(),
            dpop_enabled: false,
            request_timeout: Duration::from_secs(30),
            default_username: "oauth-user".to_string(),
        }
    }
}

impl fmt::Debug for OAuthClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(!self.client_secret.is_empty()))
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("authorization_uri", &self.authorization_uri)
            .field("token_uri", &self.token_uri)
            .field("userinfo_uri", &self.userinfo_uri)
            .field("dpop_enabled", &self.dpop_enabled)
            .field("request_timeout", &self.request_timeout)
            .field("default_username", &self.default_username)
            .finish()
    }
}

fn redact(present: bool) -> &'static str {
    if present { "[REDACTED]" } else { "<none>" }
}

// =============================================================================
// Client Config
// =============================================================================

/// Validated OAuth client configuration, immutable for the process lifetime.
#[derive(Clone)]
pub struct ClientConfig {
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    scope: String,
    authorization_uri: Url,
    token_uri: Url,
    userinfo_uri: Option<Url>,
    dpop_enabled: bool,
    request_timeout: Duration,
    default_username: String,
}

impl ClientConfig {
    /// Validates settings and builds the client configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `client_id`, `redirect_uri`,
    /// `scope`, `authorization_uri` or `token_uri` is empty, and
    /// `ConfigError::InvalidValue` if an endpoint is not an absolute
    /// `http`/`https` URL or the timeout is zero.
    pub fn from_settings(settings: &OAuthClientSettings) -> Result<Self, ConfigError> {
        let client_id = required("oauth.client_id", &settings.client_id)?;
        let scope = required("oauth.scope", &settings.scope)?;
        // Kept verbatim, only validated as a URL
        let redirect_uri = required("oauth.redirect_uri", &settings.redirect_uri)?;
        endpoint("oauth.redirect_uri", &redirect_uri)?;
        let authorization_uri = endpoint("oauth.authorization_uri", &settings.authorization_uri)?;
        let token_uri = endpoint("oauth.token_uri", &settings.token_uri)?;

        let userinfo_uri = if settings.userinfo_uri.trim().is_empty() {
            None
        } else {
            Some(endpoint("oauth.userinfo_uri", &settings.userinfo_uri)?)
        };

        if settings.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "oauth.request_timeout must be greater than 0".to_string(),
            ));
        }

        let default_username = required("oauth.default_username", &settings.default_username)?;

        let client_secret = Some(settings.client_secret.clone()).filter(|s| !s.is_empty());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scope,
            authorization_uri,
            token_uri,
            userinfo_uri,
            dpop_enabled: settings.dpop_enabled,
            request_timeout: settings.request_timeout,
            default_username,
        })
    }

    /// Client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret, if this is a confidential client.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Registered redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Requested scopes.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Authorization endpoint.
    #[must_use]
    pub fn authorization_uri(&self) -> &Url {
        &self.authorization_uri
    }

    /// Token endpoint.
    #[must_use]
    pub fn token_uri(&self) -> &Url {
        &self.token_uri
    }

    /// Userinfo endpoint, if configured.
    #[must_use]
    pub fn userinfo_uri(&self) -> Option<&Url> {
        self.userinfo_uri.as_ref()
    }

    /// Whether DPoP is enabled.
    #[must_use]
    pub fn dpop_enabled(&self) -> bool {
        self.dpop_enabled
    }

    /// Timeout for outbound calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Fallback username.
    #[must_use]
    pub fn default_username(&self) -> &str {
        &self.default_username
    }
}

impl TryFrom<&OAuthClientSettings> for ClientConfig {
    type Error = ConfigError;

    fn try_from(settings: &OAuthClientSettings) -> Result<Self, Self::Error> {
        Self::from_settings(settings)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(self.client_secret.is_some()))
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("authorization_uri", &self.authorization_uri.as_str())
            .field("token_uri", &self.token_uri.as_str())
            .field("userinfo_uri", &self.userinfo_uri.as_ref().map(Url::as_str))
            .field("dpop_enabled", &self.dpop_enabled)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn required(name: &str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(name.to_string()));
    }
    Ok(value.to_string())
}

fn endpoint(name: &str, value: &str) -> Result<Url, ConfigError> {
    let value = required(name, value)?;
    let url = Url::parse(&value)
        .map_err(|e| ConfigError::InvalidValue(format!("{name} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ConfigError::InvalidValue(format!(
            "{name} must be an absolute http(s) URL, got '{value}'"
        ))),
    }
}

// =============================================================================
// DPoP Settings
// =============================================================================

/// Location of the persisted DPoP keypair.
///
/// Missing or unreadable files are not an error; a fresh keypair is
/// generated instead.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DpopSettings {
    /// PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub private_key_path: PathBuf,

    /// OpenSSH `ssh-rsa` public key.
    pub public_key_path: PathBuf,
}

impl Default for DpopSettings {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("ssh/id_rsa"),
            public_key_path: PathBuf::from("ssh/id_rsa.pub"),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Browser session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// Set the `Secure` attribute on the session cookie.
    pub secure_cookies: bool,

    /// Sessions untouched for this long are discarded.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How often idle sessions are purged.
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "FRONTDOOR_SESSION".to_string(),
            secure_cookies: false,
            idle_timeout: Duration::from_secs(30 * 60),
            purge_interval: Duration::from_secs(60),
        }
    }
}

impl SessionSettings {
    /// Validates the session settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the cookie name is empty or
    /// contains characters not allowed in a cookie name, or if either
    /// duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_name = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid_name {
            return Err(ConfigError::InvalidValue(format!(
                "session.cookie_name '{}' is not a valid cookie name",
                self.cookie_name
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.idle_timeout must be greater than 0".to_string(),
            ));
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.purge_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Filter Settings
// =============================================================================

/// Authentication filter settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Paths served without authentication in addition to the login flow
    /// endpoints. Entries ending in `/*` match a whole subtree.
    ///
    /// Accepts a list or a comma-separated string, the latter being what
    /// environment overrides provide.
    #[serde(deserialize_with = "path_list")]
    pub extra_public_paths: Vec<String>,
}

fn path_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PathList {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match PathList::deserialize(deserializer)? {
        PathList::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        PathList::List(paths) => paths,
    })
}

impl FilterSettings {
    /// Validates the filter settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a path does not start with `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.extra_public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::InvalidValue(format!(
                "filter.extra_public_paths entry '{bad}' must start with '/'"
            )));
        }
        Ok(())
    }
}
