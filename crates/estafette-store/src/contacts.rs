use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserRecord;
use crate::users::row_to_user;

/// Normalize an unordered pair so each edge is stored exactly once.
fn normalize(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Database {
    /// All contacts of a user, either side of the edge.
    pub fn get_contacts(&self, user_id: i64) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.login, u.password_hash, u.verbose_name, u.created_at
             FROM contacts c
             JOIN users u
               ON u.id = CASE WHEN c.user_lo = ?1 THEN c.user_hi ELSE c.user_lo END
             WHERE c.user_lo = ?1 OR c.user_hi = ?1
             ORDER BY u.login",
        )?;

        let rows = stmt.query_map(params![user_id], row_to_user)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Create a contact edge. Fails with [`StoreError::AlreadyExists`] if the
    /// unordered pair already has one.
    pub fn create_contact_edge(&self, a: i64, b: i64) -> Result<i64> {
        let (lo, hi) = normalize(a, b);

        let existing: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM contacts WHERE user_lo = ?1 AND user_hi = ?2",
                params![lo, hi],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Err(StoreError::AlreadyExists("Chat".to_string()));
        }

        self.conn().execute(
            "INSERT INTO contacts (user_lo, user_hi, created_at) VALUES (?1, ?2, ?3)",
            params![lo, hi, Utc::now().to_rfc3339()],
        )?;

        Ok(self.conn().last_insert_rowid())
    }

    /// Delete a contact edge. Fails with [`StoreError::NotFound`] if absent.
    pub fn delete_contact_edge(&self, a: i64, b: i64) -> Result<()> {
        let (lo, hi) = normalize(a, b);

        let affected = self.conn().execute(
            "DELETE FROM contacts WHERE user_lo = ?1 AND user_hi = ?2",
            params![lo, hi],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn edge_count(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn edge_is_mutual() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        db.create_contact_edge(alice, bob).unwrap();

        assert_eq!(db.get_contacts(alice).unwrap()[0].login, "bob");
        assert_eq!(db.get_contacts(bob).unwrap()[0].login, "alice");
    }

    #[test]
    fn duplicate_edge_conflicts_in_either_order() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        db.create_contact_edge(alice, bob).unwrap();

        let err = db.create_contact_edge(bob, alice).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(edge_count(&db), 1);
    }

    #[test]
    fn delete_missing_edge_is_not_found() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        let err = db.delete_contact_edge(alice, bob).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        db.create_contact_edge(alice, bob).unwrap();
        db.delete_contact_edge(bob, alice).unwrap();
        assert_eq!(edge_count(&db), 0);
    }
}
