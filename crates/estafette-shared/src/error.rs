use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid envelope or wrong key")]
    DecryptionFailed,

    #[error("Key size does not match the protocol constant")]
    InvalidKeySize,

    #[error("Malformed public key tuple")]
    InvalidKeyTuple,

    #[error("Failed to generate key pair")]
    KeyGeneration,
}

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected payload for action {0}")]
    UnexpectedPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
