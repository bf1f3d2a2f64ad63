use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserRecord;

impl Database {
    /// Look up a single user by login.
    pub fn get_user(&self, login: &str) -> Result<Option<UserRecord>> {
        self.conn()
            .query_row(
                "SELECT id, login, password_hash, verbose_name, created_at
                 FROM users WHERE login = ?1",
                params![login],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Create a user. Fails with [`StoreError::AlreadyExists`] if the login
    /// is taken. The display name defaults to `@login`.
    pub fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        verbose_name: Option<&str>,
    ) -> Result<i64> {
        if self.get_user(login)?.is_some() {
            return Err(StoreError::AlreadyExists(format!("User <{login}>")));
        }

        let verbose_name = verbose_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("@{login}"));

        self.conn().execute(
            "INSERT INTO users (login, password_hash, verbose_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![login, password_hash, verbose_name, Utc::now().to_rfc3339()],
        )?;

        Ok(self.conn().last_insert_rowid())
    }

    /// Find users whose login matches a SQL LIKE pattern.
    pub fn search_users(&self, pattern: &str) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, login, password_hash, verbose_name, created_at
             FROM users WHERE login LIKE ?1 ORDER BY login",
        )?;

        let rows = stmt.query_map(params![pattern], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Record a successful authentication (ip + timestamp).
    pub fn record_login(&self, user_id: i64, address: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO login_history (user_id, address, date) VALUES (?1, ?2, ?3)",
            params![user_id, address, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let ts_str: String = row.get(4)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserRecord {
        id: row.get(0)?,
        login: row.get(1)?,
        password_hash: row.get(2)?,
        verbose_name: row.get(3)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn create_and_get_user() {
        let (_dir, db) = open_db();

        let id = db.create_user("alice", "hash", None).unwrap();
        let user = db.get_user("alice").unwrap().unwrap();

        assert_eq!(user.id, id);
        assert_eq!(user.login, "alice");
        assert_eq!(user.password_hash, "hash");
        assert_eq!(user.verbose_name.as_deref(), Some("@alice"));
    }

    #[test]
    fn duplicate_login_rejected() {
        let (_dir, db) = open_db();

        db.create_user("alice", "hash", None).unwrap();
        let err = db.create_user("alice", "other", None).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        // No second record was created.
        assert_eq!(db.search_users("alice").unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_is_none() {
        let (_dir, db) = open_db();
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn search_by_pattern() {
        let (_dir, db) = open_db();

        db.create_user("alice", "h", None).unwrap();
        db.create_user("alina", "h", None).unwrap();
        db.create_user("bob", "h", None).unwrap();

        let found = db.search_users("ali%").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].login, "alice");
        assert_eq!(found[1].login, "alina");
    }

    #[test]
    fn record_login_inserts_history_row() {
        let (_dir, db) = open_db();

        let id = db.create_user("alice", "h", None).unwrap();
        db.record_login(id, "127.0.0.1").unwrap();

        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM login_history WHERE user_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
