//! The hybrid wire envelope.
//!
//! Layout: `wrapped_symmetric_key (WRAPPED_KEY_SIZE bytes) || nonce || ciphertext`.
//! A fresh symmetric key is generated for every [`seal`] call and RSA-wrapped
//! with the recipient's public key, so each message stands alone.
//!
//! [`open`] collapses every failure into [`CryptoError::DecryptionFailed`];
//! callers drop undecryptable traffic without answering, so foreign-keyed or
//! corrupted envelopes get no signal back.

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::constants::WRAPPED_KEY_SIZE;
use crate::crypto::{self, SymmetricKey};
use crate::error::CryptoError;

/// Encrypt a serialized request for `recipient`.
pub fn seal(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    if recipient.size() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }

    let key = crypto::generate_symmetric_key();
    let wrapped = recipient
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &key)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let body = crypto::encrypt(&key, plaintext)?;

    let mut output = Vec::with_capacity(WRAPPED_KEY_SIZE + body.len());
    output.extend_from_slice(&wrapped);
    output.extend_from_slice(&body);
    Ok(output)
}

/// Decrypt an envelope with the local private key, yielding request bytes.
pub fn open(data: &[u8], own: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    if own.size() != WRAPPED_KEY_SIZE || data.len() <= WRAPPED_KEY_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (wrapped, body) = data.split_at(WRAPPED_KEY_SIZE);
    let key_bytes = own
        .decrypt(Pkcs1v15Encrypt, wrapped)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let key: SymmetricKey = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;

    crypto::decrypt(&key, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WRAPPED_KEY_SIZE;
    use crate::proto::{Action, Request};
    use crate::test_keys;

    #[test]
    fn seal_open_round_trip() {
        let (public, private) = test_keys::pair();
        let request = Request::new(Action::Quit, None, None);
        let plaintext = request.to_bytes().unwrap();

        let envelope = seal(&plaintext, public).unwrap();
        assert!(envelope.len() > WRAPPED_KEY_SIZE);

        let opened = open(&envelope, private).unwrap();
        assert_eq!(Request::from_bytes(&opened).unwrap(), request);
    }

    #[test]
    fn fresh_key_per_message() {
        let (public, _) = test_keys::pair();
        let first = seal(b"same plaintext", public).unwrap();
        let second = seal(b"same plaintext", public).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn mismatched_private_key_fails() {
        let (public, _) = test_keys::pair();
        let (_, other_private) = test_keys::other_pair();

        let envelope = seal(b"payload", public).unwrap();
        assert!(open(&envelope, other_private).is_err());
    }

    #[test]
    fn truncated_envelope_fails() {
        let (public, private) = test_keys::pair();
        let envelope = seal(b"payload", public).unwrap();
        assert!(open(&envelope[..WRAPPED_KEY_SIZE], private).is_err());
        assert!(open(&envelope[..16], private).is_err());
    }

    #[test]
    fn corrupted_wrapped_key_fails() {
        let (public, private) = test_keys::pair();
        let mut envelope = seal(b"payload", public).unwrap();
        envelope[0] ^= 0xFF;
        assert!(open(&envelope, private).is_err());
    }
}
