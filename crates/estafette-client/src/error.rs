use thiserror::Error;

use estafette_shared::proto::Status;
use estafette_shared::{CryptoError, ProtoError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Server refused the request: {message}")]
    Rejected {
        status: Option<Status>,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
