//! # estafette-shared
//!
//! Wire protocol and cryptography shared by the Estafette server and client:
//! the JSON request types, the hybrid RSA + XChaCha20-Poly1305 envelope, the
//! clear-text key-exchange tuple, and length-prefixed framing.

pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod framing;
pub mod keys;
pub mod proto;

mod error;

pub use error::{CryptoError, ProtoError};

#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::OnceLock;

    use rsa::{RsaPrivateKey, RsaPublicKey};

    // Key generation is slow in debug builds; share one pair per process.
    static PAIR: OnceLock<(RsaPublicKey, RsaPrivateKey)> = OnceLock::new();
    static OTHER: OnceLock<(RsaPublicKey, RsaPrivateKey)> = OnceLock::new();

    pub fn pair() -> &'static (RsaPublicKey, RsaPrivateKey) {
        PAIR.get_or_init(|| crate::keys::generate_keypair().unwrap())
    }

    pub fn other_pair() -> &'static (RsaPublicKey, RsaPrivateKey) {
        OTHER.get_or_init(|| crate::keys::generate_keypair().unwrap())
    }
}
