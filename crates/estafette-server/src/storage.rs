//! The Data-Access Interface the router speaks.
//!
//! The router never names a storage engine; it only needs these operations.
//! [`estafette_store::Database`] is the production implementation, and tests
//! substitute an in-memory one.

use chrono::{DateTime, Utc};

use estafette_store::{Database, Result, StoredMessage, UserRecord};

/// Persistence operations required by the request router.
pub trait Storage: Send + 'static {
    /// Look up a user by login.
    fn get_user(&self, login: &str) -> Result<Option<UserRecord>>;

    /// Create a user; fails if the login is taken.
    fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        verbose_name: Option<&str>,
    ) -> Result<i64>;

    /// Find users whose login matches a SQL LIKE pattern.
    fn search_users(&self, pattern: &str) -> Result<Vec<UserRecord>>;

    /// Record a successful authentication (ip + timestamp).
    fn record_login(&self, user_id: i64, address: &str) -> Result<()>;

    /// All contacts of a user.
    fn get_contacts(&self, user_id: i64) -> Result<Vec<UserRecord>>;

    /// Create a contact edge; fails if the unordered pair already has one.
    fn create_contact_edge(&self, a: i64, b: i64) -> Result<i64>;

    /// Delete a contact edge; fails if absent.
    fn delete_contact_edge(&self, a: i64, b: i64) -> Result<()>;

    /// Persist a chat message with its delivery flag.
    fn create_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        text: &str,
        date: DateTime<Utc>,
        delivered: bool,
    ) -> Result<i64>;

    /// Fetch all undelivered messages for a recipient, marking them delivered.
    fn get_undelivered_messages(&self, recipient_id: i64) -> Result<Vec<StoredMessage>>;
}

impl Storage for Database {
    fn get_user(&self, login: &str) -> Result<Option<UserRecord>> {
        Database::get_user(self, login)
    }

    fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        verbose_name: Option<&str>,
    ) -> Result<i64> {
        Database::create_user(self, login, password_hash, verbose_name)
    }

    fn search_users(&self, pattern: &str) -> Result<Vec<UserRecord>> {
        Database::search_users(self, pattern)
    }

    fn record_login(&self, user_id: i64, address: &str) -> Result<()> {
        Database::record_login(self, user_id, address)
    }

    fn get_contacts(&self, user_id: i64) -> Result<Vec<UserRecord>> {
        Database::get_contacts(self, user_id)
    }

    fn create_contact_edge(&self, a: i64, b: i64) -> Result<i64> {
        Database::create_contact_edge(self, a, b)
    }

    fn delete_contact_edge(&self, a: i64, b: i64) -> Result<()> {
        Database::delete_contact_edge(self, a, b)
    }

    fn create_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        text: &str,
        date: DateTime<Utc>,
        delivered: bool,
    ) -> Result<i64> {
        Database::create_message(self, sender_id, recipient_id, text, date, delivered)
    }

    fn get_undelivered_messages(&self, recipient_id: i64) -> Result<Vec<StoredMessage>> {
        Database::get_undelivered_messages(self, recipient_id)
    }
}
