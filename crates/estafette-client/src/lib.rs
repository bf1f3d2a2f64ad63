//! # estafette-client
//!
//! The Estafette client library: connects to a server, completes the key
//! exchange, and exposes the protocol as async methods plus a stream of
//! [`ClientEvent`]s for UIs to consume.

pub mod client;
pub mod events;

mod error;

pub use client::Client;
pub use error::{ClientError, Result};
pub use events::ClientEvent;
