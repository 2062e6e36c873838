//! Authentication error types.
//!
//! This module defines the error taxonomy of the relying-party flow. Every
//! variant maps to a user-safe error code (see [`AuthError::user_error_code`])
//! that is the only thing ever shown to the browser; the detailed message is
//! for logs.

use std::fmt;

use crate::dpop::keys::KeyLoadError;

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1) that are
/// safe to forward from the provider to the login page.
const FORWARDABLE_PROVIDER_ERRORS: &[&str] = &[
    "access_denied",
    "invalid_request",
    "unauthorized_client",
    "unsupported_response_type",
    "invalid_scope",
    "server_error",
    "temporarily_unavailable",
];

/// Errors that can occur while authenticating a user.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client configuration is incomplete or malformed.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The `state` returned by the authorization server does not match the
    /// value stored in the session.
    #[error("CSRF validation failed: {message}")]
    CsrfValidation {
        /// Description of why validation failed.
        message: String,
    },

    /// No PKCE code verifier was found for the session.
    #[error("PKCE code verifier missing from session")]
    MissingPkceVerifier,

    /// The authorization server redirected back with an `error` parameter.
    #[error("Authorization server error: {error}")]
    AuthorizationServer {
        /// The OAuth error code supplied by the provider.
        error: String,
        /// Optional `error_description` supplied by the provider.
        description: Option<String>,
    },

    /// A required callback parameter was absent or empty.
    #[error("Missing callback parameter: {name}")]
    MissingParameter {
        /// Name of the missing parameter.
        name: &'static str,
    },

    /// Exchanging the authorization code at the token endpoint failed.
    #[error("Token exchange failed: {message}")]
    TokenExchange {
        /// HTTP status returned by the token endpoint, if a response arrived.
        status: Option<u16>,
        /// Raw diagnostic body returned by the token endpoint (logs only).
        body: Option<String>,
        /// Description of the failure.
        message: String,
    },

    /// The DPoP keypair could not be loaded.
    #[error("Key load error: {0}")]
    KeyLoad(#[from] KeyLoadError),

    /// A DPoP proof could not be signed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// The userinfo endpoint could not be queried.
    #[error("UserInfo request failed: {message}")]
    UserInfo {
        /// Description of the failure.
        message: String,
    },

    /// An error occurred while storing or retrieving session state.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `CsrfValidation` error.
    #[must_use]
    pub fn csrf_validation(message: impl Into<String>) -> Self {
        Self::CsrfValidation {
            message: message.into(),
        }
    }

    /// Creates a new `AuthorizationServer` error.
    #[must_use]
    pub fn authorization_server(error: impl Into<String>, description: Option<String>) -> Self {
        Self::AuthorizationServer {
            error: error.into(),
            description,
        }
    }

    /// Creates a new `MissingParameter` error.
    #[must_use]
    pub fn missing_parameter(name: &'static str) -> Self {
        Self::MissingParameter { name }
    }

    /// Creates a `TokenExchange` error without an HTTP response.
    #[must_use]
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchange {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// Creates a `TokenExchange` error carrying the token endpoint's response.
    #[must_use]
    pub fn token_exchange_response(
        status: u16,
        body: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TokenExchange {
            status: Some(status),
            body: Some(body.into()),
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `UserInfo` error.
    #[must_use]
    pub fn user_info(message: impl Into<String>) -> Self {
        Self::UserInfo {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` if this error ends the process at startup.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if this error is part of the authorization callback
    /// protocol (the session's pending state must be discarded).
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::CsrfValidation { .. }
                | Self::MissingPkceVerifier
                | Self::AuthorizationServer { .. }
                | Self::MissingParameter { .. }
                | Self::TokenExchange { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::CsrfValidation { .. } => ErrorCategory::Csrf,
            Self::MissingPkceVerifier => ErrorCategory::Csrf,
            Self::AuthorizationServer { .. } => ErrorCategory::Provider,
            Self::MissingParameter { .. } => ErrorCategory::Validation,
            Self::TokenExchange { .. } => ErrorCategory::Provider,
            Self::KeyLoad(_) => ErrorCategory::Crypto,
            Self::Signing { .. } => ErrorCategory::Crypto,
            Self::UserInfo { .. } => ErrorCategory::Provider,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// Returns the error code that may be shown to the user agent.
    ///
    /// Provider-supplied codes are forwarded only when they are one of the
    /// registered RFC 6749 authorization error codes.
    #[must_use]
    pub fn user_error_code(&self) -> &str {
        match self {
            Self::CsrfValidation { .. } => "invalid_state",
            Self::MissingPkceVerifier => "missing_code_verifier",
            Self::MissingParameter { name: "code" } => "missing_code",
            Self::MissingParameter { name: "state" } => "missing_state",
            Self::MissingParameter { .. } => "authorization_failed",
            Self::AuthorizationServer { error, .. } => FORWARDABLE_PROVIDER_ERRORS
                .iter()
                .find(|code| **code == error.as_str())
                .copied()
                .unwrap_or("authorization_failed"),
            Self::TokenExchange { .. } => "token_exchange_failed",
            Self::Configuration { .. }
            | Self::KeyLoad(_)
            | Self::Signing { .. }
            | Self::UserInfo { .. }
            | Self::Storage { .. } => "authorization_failed",
        }
    }
}

/// Categories of authentication errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Startup configuration errors.
    Configuration,
    /// State/verifier binding errors.
    Csrf,
    /// Errors reported by or while talking to the authorization server.
    Provider,
    /// Malformed requests.
    Validation,
    /// Key material and signing errors.
    Crypto,
    /// Session storage errors.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Csrf => write!(f, "csrf"),
            Self::Provider => write!(f, "provider"),
            Self::Validation => write!(f, "validation"),
            Self::Crypto => write!(f, "crypto"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
