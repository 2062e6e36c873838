//! PKCE (Proof Key for Code Exchange) parameter generation.
//!
//! Implements the client side of RFC 7636 with the S256 method only. A login
//! attempt always gets a fresh [`PkceParams`]: an anti-CSRF `state` and a
//! `code_verifier`, both drawn from the unreserved URI alphabet, plus the
//! derived `code_challenge`.
//!
//! # Example
//!
//! ```
//! use frontdoor_auth::oauth::{PkceChallenge, PkceParams};
//!
//! let params = PkceParams::generate();
//! assert_eq!(params.state.len(), 32);
//! assert_eq!(params.code_verifier.as_str().len(), 64);
//!
//! let challenge = PkceChallenge::from_verifier(&params.code_verifier);
//! assert_eq!(challenge.as_str(), params.code_challenge.as_str());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the generated `state` parameter.
pub const STATE_LENGTH: usize = 32;

/// Length of the generated `code_verifier`.
pub const CODE_VERIFIER_LENGTH: usize = 64;

/// RFC 3986 unreserved characters: `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,
}

impl PkceError {
    /// Create an `InvalidVerifierLength` error.
    #[must_use]
    pub fn invalid_verifier_length(len: usize) -> Self {
        Self::InvalidVerifierLength(len)
    }
}

// =============================================================================
// Random Strings
// =============================================================================

/// Generates a random string of `len` characters drawn uniformly from the
/// unreserved alphabet.
///
/// Uses the thread-local CSPRNG (ChaCha, seeded from the operating system).
#[must_use]
pub fn generate_random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| UNRESERVED[rng.gen_range(0..UNRESERVED.len())] as char)
        .collect()
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method. "plain" is never offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string over the unreserved characters, 43 to 128
/// characters long (RFC 7636 Section 4.1).
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a verifier from an externally supplied string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not between 43 and 128 characters or
    /// the string contains characters other than `[A-Za-z0-9-._~]`.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::invalid_verifier_length(len));
        }
        if !verifier.chars().all(is_unreserved) {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generate a random 64-character verifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_random_string(CODE_VERIFIER_LENGTH))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the verifier and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

// The verifier is a secret until it reaches the token endpoint.
impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PkceVerifier").field(&"[REDACTED]").finish()
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge: base64url-no-pad(SHA-256(verifier)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Derive the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(code_challenge(verifier.as_str()))
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Computes the S256 code challenge of a verifier string.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

// =============================================================================
// PKCE Parameters
// =============================================================================

/// Everything one login attempt needs: state, verifier and challenge.
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Anti-CSRF value echoed back by the authorization server.
    pub state: String,
    /// Secret presented at the token endpoint.
    pub code_verifier: PkceVerifier,
    /// Challenge sent in the authorization request.
    pub code_challenge: PkceChallenge,
    /// Always S256.
    pub method: PkceChallengeMethod,
}

impl PkceParams {
    /// Generates a fresh set of parameters.
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = PkceVerifier::generate();
        let code_challenge = PkceChallenge::from_verifier(&code_verifier);
        Self {
            state: generate_random_string(STATE_LENGTH),
            code_verifier,
            code_challenge,
            method: PkceChallengeMethod::S256,
        }
    }
}
