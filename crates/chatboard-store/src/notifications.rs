use chrono::{DateTime, Utc};
use rusqlite::params;

use chatboard_shared::models::Notification;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert a notification row and return the assigned id.
    pub fn insert_notification(
        &self,
        username: &str,
        message: &str,
        kind: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO notifications (username, message, type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, message, kind, created_at.to_rfc3339()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Recent backlog for one recipient, newest first.
    pub fn notifications_for(&self, username: &str, limit: u32) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, message, type, is_read, created_at
             FROM notifications
             WHERE username = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![username, limit], row_to_notification)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Flip `is_read` to true.  Idempotent; marking an unknown id is a
    /// no-op.  Returns whether the row exists.
    pub fn mark_notification_read(&self, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let created_str: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let is_read_int: i32 = row.get(4)?;

    Ok(Notification {
        id: row.get(0)?,
        username: row.get(1)?,
        message: row.get(2)?,
        kind: row.get(3)?,
        is_read: is_read_int != 0,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_is_per_recipient_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();
        db.insert_notification("alice", "first", "info", base).unwrap();
        db.insert_notification("alice", "second", "info", base + chrono::Duration::seconds(1))
            .unwrap();
        db.insert_notification("bob", "other", "info", base).unwrap();

        let backlog = db.notifications_for("alice", 50).unwrap();
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].message, "second");
        assert!(backlog.iter().all(|n| !n.is_read));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_notification("alice", "hi", "info", Utc::now())
            .unwrap();

        assert!(db.mark_notification_read(id).unwrap());
        // Marking again neither errors nor flips the flag back.
        assert!(db.mark_notification_read(id).unwrap());
        let backlog = db.notifications_for("alice", 50).unwrap();
        assert!(backlog[0].is_read);

        assert!(!db.mark_notification_read(9999).unwrap());
    }
}
