//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `login_history`, `contacts`,
//! and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    login         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- hex-encoded BLAKE3
    verbose_name  TEXT,
    created_at    TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Login history (ip + timestamp per successful authentication)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS login_history (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    date    TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_login_history_user ON login_history(user_id);

-- ----------------------------------------------------------------
-- Contact graph: one row per unordered pair, normalized lo < hi
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_lo    INTEGER NOT NULL,
    user_hi    INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (user_lo, user_hi),
    FOREIGN KEY (user_lo) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (user_hi) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages (store-and-forward log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id    INTEGER NOT NULL,
    recipient_id INTEGER NOT NULL,
    content      TEXT NOT NULL,
    date         TEXT NOT NULL,                -- ISO-8601
    delivered    INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1

    FOREIGN KEY (sender_id)    REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (recipient_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_undelivered
    ON messages(recipient_id, delivered);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
