//! # estafette-server
//!
//! The Estafette messaging server: a TCP listener speaking the sealed JSON
//! protocol from `estafette-shared`, with sessions, contact management and
//! store-and-forward message delivery backed by `estafette-store`.

pub mod config;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;

mod error;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::{Server, ShutdownHandle};
pub use storage::Storage;
