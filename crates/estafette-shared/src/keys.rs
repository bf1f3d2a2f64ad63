//! RSA key pairs and the clear-text key-exchange tuple.
//!
//! Both ends announce their public key as a JSON two-element array
//! `[modulus, exponent]` with decimal integers: the server immediately after
//! accept, the client as the payload of its `presence` request. The numbers
//! exceed u64, so they ride through `serde_json::Value` with the
//! `arbitrary_precision` feature.

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde_json::Value;

use crate::constants::RSA_KEY_BITS;
use crate::error::CryptoError;

/// Generate a fresh RSA key pair of the protocol size.
pub fn generate_keypair() -> Result<(RsaPublicKey, RsaPrivateKey), CryptoError> {
    let private =
        RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|_| CryptoError::KeyGeneration)?;
    let public = RsaPublicKey::from(&private);
    Ok((public, private))
}

/// Encode a public key as the `[modulus, exponent]` JSON value.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<Value, CryptoError> {
    let raw = format!(
        "[{},{}]",
        key.n().to_str_radix(10),
        key.e().to_str_radix(10)
    );
    serde_json::from_str(&raw).map_err(|_| CryptoError::InvalidKeyTuple)
}

/// Decode a `[modulus, exponent]` JSON value into a public key.
pub fn decode_public_key(value: &Value) -> Result<RsaPublicKey, CryptoError> {
    let parts = value.as_array().ok_or(CryptoError::InvalidKeyTuple)?;
    if parts.len() != 2 {
        return Err(CryptoError::InvalidKeyTuple);
    }

    let n = biguint_from(&parts[0])?;
    let e = biguint_from(&parts[1])?;

    RsaPublicKey::new(n, e).map_err(|_| CryptoError::InvalidKeyTuple)
}

/// Serialize a public key tuple for the clear-text handshake frame.
pub fn public_key_to_wire(key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    let value = encode_public_key(key)?;
    serde_json::to_vec(&value).map_err(|_| CryptoError::InvalidKeyTuple)
}

/// Parse a clear-text handshake frame back into a public key.
pub fn public_key_from_wire(data: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    let value: Value = serde_json::from_slice(data).map_err(|_| CryptoError::InvalidKeyTuple)?;
    decode_public_key(&value)
}

fn biguint_from(value: &Value) -> Result<BigUint, CryptoError> {
    let digits = match value {
        Value::Number(number) => number.to_string(),
        _ => return Err(CryptoError::InvalidKeyTuple),
    };
    BigUint::parse_bytes(digits.as_bytes(), 10).ok_or(CryptoError::InvalidKeyTuple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys;

    #[test]
    fn tuple_round_trip() {
        let (public, _) = test_keys::pair();
        let value = encode_public_key(public).unwrap();
        let restored = decode_public_key(&value).unwrap();
        assert_eq!(&restored, public);
    }

    #[test]
    fn wire_round_trip() {
        let (public, _) = test_keys::pair();
        let bytes = public_key_to_wire(public).unwrap();
        let restored = public_key_from_wire(&bytes).unwrap();
        assert_eq!(&restored, public);
    }

    #[test]
    fn decodes_handshake_literal() {
        let value: Value = serde_json::from_str("[65537, 3]").unwrap();
        let key = decode_public_key(&value).unwrap();
        assert_eq!(key.n(), &BigUint::from(65537u32));
        assert_eq!(key.e(), &BigUint::from(3u32));
    }

    #[test]
    fn rejects_malformed_tuples() {
        for raw in ["[]", "[1]", "[1,2,3]", "\"key\"", "[1.5, 3]", "[-7, 3]"] {
            let value: Value = serde_json::from_str(raw).unwrap();
            assert!(decode_public_key(&value).is_err(), "accepted {raw}");
        }
    }
}
