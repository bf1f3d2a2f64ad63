use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredMessage;

impl Database {
    /// Persist a chat message.
    ///
    /// `delivered` is true when the recipient was online and the push went
    /// out at send time; false queues the message for the recipient's next
    /// history fetch.
    pub fn create_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        text: &str,
        date: DateTime<Utc>,
        delivered: bool,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages (sender_id, recipient_id, content, date, delivered)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![sender_id, recipient_id, text, date.to_rfc3339(), delivered],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Fetch all undelivered messages for a recipient and mark them delivered.
    ///
    /// A second call returns nothing until new messages arrive.
    pub fn get_undelivered_messages(&self, recipient_id: i64) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, s.login, r.login, m.content, m.date, m.delivered
             FROM messages m
             JOIN users s ON s.id = m.sender_id
             JOIN users r ON r.id = m.recipient_id
             WHERE m.recipient_id = ?1 AND m.delivered = 0
             ORDER BY m.date",
        )?;

        let rows = stmt.query_map(params![recipient_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        for message in &mut messages {
            self.conn().execute(
                "UPDATE messages SET delivered = 1 WHERE id = ?1",
                params![message.id],
            )?;
            message.delivered = true;
        }

        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let ts_str: String = row.get(4)?;
    let date: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredMessage {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        text: row.get(3)?,
        date,
        delivered: row.get(5)?,
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
    fn undelivered_fetch_marks_delivered_once() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        db.create_message(alice, bob, "offline one", Utc::now(), false)
            .unwrap();
        db.create_message(alice, bob, "offline two", Utc::now(), false)
            .unwrap();

        let fetched = db.get_undelivered_messages(bob).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|m| m.delivered));
        assert_eq!(fetched[0].text, "offline one");
        assert_eq!(fetched[0].sender, "alice");
        assert_eq!(fetched[0].recipient, "bob");

        // Already-delivered messages are not repeated.
        assert!(db.get_undelivered_messages(bob).unwrap().is_empty());
    }

    #[test]
    fn delivered_at_send_time_is_not_fetched() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        db.create_message(alice, bob, "pushed live", Utc::now(), true)
            .unwrap();

        assert!(db.get_undelivered_messages(bob).unwrap().is_empty());
    }

    #[test]
    fn fetch_is_scoped_to_recipient() {
        let (_dir, db) = open_db();
        let alice = db.create_user("alice", "h", None).unwrap();
        let bob = db.create_user("bob", "h", None).unwrap();

        db.create_message(alice, bob, "for bob", Utc::now(), false)
            .unwrap();

        assert!(db.get_undelivered_messages(alice).unwrap().is_empty());
        assert_eq!(db.get_undelivered_messages(bob).unwrap().len(), 1);
    }
}
