//! Domain model structs persisted in the server database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    /// Row id assigned by the store.
    pub id: i64,
    /// Unique login.
    pub login: String,
    /// BLAKE3 password hash (hex). Never leaves the store layer in clear.
    pub password_hash: String,
    /// Optional display name (defaults to `@login` on creation).
    pub verbose_name: Option<String>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// A persisted chat message.
///
/// `delivered` starts false and flips to true either at send time (recipient
/// online) or on the recipient's next history fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    /// Sender login.
    pub sender: String,
    /// Recipient login.
    pub recipient: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub delivered: bool,
}
