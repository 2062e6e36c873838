//! DPoP (RFC 9449) proof-of-possession support.
//!
//! - [`keys`] - RSA keypair loading with generate-on-failure fallback
//! - [`proof`] - per-request proof JWT signing

pub mod keys;
pub mod proof;

pub use keys::{
    DpopKeyManager, KeyLoadError, KeyOrigin, PemPrivateKeyLoader, PrivateKeyLoader,
    encode_ssh_public_key, parse_ssh_public_key, rsa_jwk_thumbprint,
};
pub use proof::{DpopClaims, DpopProofGenerator};

/// HTTP header carrying the proof.
pub const DPOP_HEADER: &str = "DPoP";

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, LazyLock};

    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    use super::{DpopKeyManager, KeyOrigin};

    // Key generation is slow; share keys across tests.
    static KEY: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key"));
    static OTHER_KEY: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key"));

    pub(crate) fn test_private_key() -> &'static RsaPrivateKey {
        &KEY
    }

    pub(crate) fn other_private_key() -> &'static RsaPrivateKey {
        &OTHER_KEY
    }

    pub(crate) fn test_key_manager() -> Arc<DpopKeyManager> {
        Arc::new(
            DpopKeyManager::from_private_key(test_private_key(), KeyOrigin::Loaded)
                .expect("wrap test key"),
        )
    }
}
