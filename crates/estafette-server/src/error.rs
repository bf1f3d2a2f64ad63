use thiserror::Error;

use estafette_shared::CryptoError;
use estafette_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection {0} is not tracked")]
    PeerNotConnected(u64),

    #[error("No public key exchanged on connection {0}")]
    NoPeerKey(u64),
}

pub type Result<T> = std::result::Result<T, ServerError>;
