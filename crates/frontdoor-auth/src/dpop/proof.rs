//! DPoP proof JWT generation.
//!
//! A proof is a compact JWS signed with the DPoP key, with the public key
//! embedded in the header so the server can verify it without any prior
//! registration:
//!
//! ```text
//! header:  {"typ":"dpop+jwt","alg":"RS256","jwk":{...}}
//! payload: {"htm":"POST","htu":"https://idp/token","iat":1700000000,"jti":"...","ath":"..."}
//! ```
//!
//! Every call produces a fresh proof; nothing is cached between requests.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use url::Url;

use super::keys::DpopKeyManager;
use crate::error::AuthError;

/// The `typ` header value of a DPoP proof.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Claims of a DPoP proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DpopClaims {
    /// HTTP method of the request.
    pub htm: String,

    /// HTTP target URI, without query and fragment.
    pub htu: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Unique proof identifier.
    pub jti: String,

    /// Hash of the access token the request carries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

impl DpopClaims {
    /// Builds claims for a request issued now.
    #[must_use]
    pub fn new(method: &str, url: &Url, access_token: Option<&str>) -> Self {
        Self {
            htm: method.to_ascii_uppercase(),
            htu: target_uri(url),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            ath: access_token.map(access_token_hash),
        }
    }
}

/// base64url(SHA-256(access_token)), the `ath` claim.
#[must_use]
pub fn access_token_hash(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

fn target_uri(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Signs DPoP proofs with the process keypair.
#[derive(Debug, Clone)]
pub struct DpopProofGenerator {
    keys: Arc<DpopKeyManager>,
}

impl DpopProofGenerator {
    /// Creates a generator over the given keys.
    #[must_use]
    pub fn new(keys: Arc<DpopKeyManager>) -> Self {
        Self { keys }
    }

    /// The key manager backing this generator.
    #[must_use]
    pub fn keys(&self) -> &DpopKeyManager {
        &self.keys
    }

    /// Creates a proof for one request.
    ///
    /// `access_token` is supplied when the request carries a DPoP-bound
    /// token; the proof then includes its `ath` hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if the JWT cannot be signed.
    pub fn generate(
        &self,
        method: &str,
        url: &Url,
        access_token: Option<&str>,
    ) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some(DPOP_JWT_TYPE.to_string());
        header.jwk = Some(self.keys.jwk().clone());

        let claims = DpopClaims::new(method, url, access_token);

        jsonwebtoken::encode(&header, &claims, self.keys.encoding_key())
            .map_err(|e| AuthError::signing(e.to_string()))
    }
}
