//! # estafette-store
//!
//! Server-side persistence for the Estafette messenger, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for user records,
//! the contact graph, the login history, and the store-and-forward message
//! log.

pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
