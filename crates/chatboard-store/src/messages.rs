//! Message CRUD: the ingestion pipeline's write path and the history reads.

use chrono::{DateTime, Utc};
use rusqlite::params;

use chatboard_shared::constants::MESSAGE_HISTORY_LIMIT;
use chatboard_shared::models::{Message, MessageDraft, MessageKind};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert a stamped draft and return the assigned id.
    ///
    /// This is the single gate for message visibility: nothing is broadcast
    /// or mirrored until this call has returned the id.
    pub fn insert_message(&self, draft: &MessageDraft) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages (username, content, type, ip, timestamp, month, duration, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                draft.username,
                draft.content,
                draft.kind.as_str(),
                draft.ip,
                draft.timestamp.to_rfc3339(),
                draft.month,
                draft.duration,
                draft.file_size,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Non-deleted messages, newest first.  An unfiltered read is capped at
    /// [`MESSAGE_HISTORY_LIMIT`] rows; a month-filtered read returns the
    /// whole bucket.
    pub fn list_messages(&self, month: Option<&str>) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        match month {
            Some(month) => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, username, content, type, ip, timestamp, month,
                            is_deleted, deleted_by, deleted_at, duration, file_size
                     FROM messages
                     WHERE is_deleted = 0 AND month = ?1
                     ORDER BY timestamp DESC",
                )?;
                let rows = stmt.query_map(params![month], row_to_message)?;
                for row in rows {
                    messages.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, username, content, type, ip, timestamp, month,
                            is_deleted, deleted_by, deleted_at, duration, file_size
                     FROM messages
                     WHERE is_deleted = 0
                     ORDER BY timestamp DESC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![MESSAGE_HISTORY_LIMIT], row_to_message)?;
                for row in rows {
                    messages.push(row?);
                }
            }
        }

        Ok(messages)
    }

    /// Distinct month buckets with at least one visible message, most
    /// recently active first.
    pub fn list_months(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT month FROM messages
             WHERE is_deleted = 0
             GROUP BY month
             ORDER BY MAX(timestamp) DESC",
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut months = Vec::new();
        for row in rows {
            months.push(row?);
        }
        Ok(months)
    }

    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, username, content, type, ip, timestamp, month,
                        is_deleted, deleted_by, deleted_at, duration, file_size
                 FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The author of a message (primary-store read, never the mirror).
    pub fn message_owner(&self, id: i64) -> Result<String> {
        self.conn()
            .query_row(
                "SELECT username FROM messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Soft-delete a message as a single conditional update.
    ///
    /// The WHERE clause carries the whole authorization decision: the row is
    /// touched only if `id` exists, `requester` is the author, and it is not
    /// already deleted.  Returns whether a row was affected — `false` means
    /// the request was not authorized (or the message is gone), and the two
    /// cases are deliberately indistinguishable to the caller.
    pub fn revoke_message(
        &self,
        id: i64,
        requester: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET is_deleted = 1, deleted_by = ?2, deleted_at = ?3
             WHERE id = ?1 AND username = ?2 AND is_deleted = 0",
            params![id, requester, deleted_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Count of visible messages authored by a user.
    pub fn message_count(&self, username: &str) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE username = ?1 AND is_deleted = 0",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind_str: String = row.get(3)?;
    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown message type: {kind_str}").into(),
        )
    })?;

    let is_deleted_int: i32 = row.get(7)?;

    Ok(Message {
        id: row.get(0)?,
        username: row.get(1)?,
        content: row.get(2)?,
        kind,
        ip: row.get(4)?,
        timestamp: parse_ts(row, 5)?,
        month: row.get(6)?,
        is_deleted: is_deleted_int != 0,
        deleted_by: row.get(8)?,
        deleted_at: {
            let raw: Option<String> = row.get(9)?;
            match raw {
                Some(s) => Some(parse_ts_str(9, &s)?),
                None => None,
            }
        },
        duration: row.get(10)?,
        file_size: row.get(11)?,
    })
}

fn parse_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts_str(idx, &raw)
}

fn parse_ts_str(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatboard_shared::month::month_bucket;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn draft(username: &str, content: &str) -> MessageDraft {
        let timestamp = Utc::now();
        MessageDraft {
            username: username.into(),
            content: content.into(),
            kind: MessageKind::Text,
            ip: "127.0.0.1".into(),
            month: month_bucket(timestamp),
            timestamp,
            duration: None,
            file_size: None,
        }
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let db = test_db();
        let first = db.insert_message(&draft("alice", "one")).unwrap();
        let second = db.insert_message(&draft("alice", "two")).unwrap();
        assert!(second > first);

        let stored = db.get_message(first).unwrap();
        assert_eq!(stored.content, "one");
        assert!(!stored.is_deleted);
    }

    #[test]
    fn revoke_is_owner_gated() {
        let db = test_db();
        let id = db.insert_message(&draft("alice", "hello")).unwrap();

        // Wrong owner: no effect.
        assert!(!db.revoke_message(id, "bob", Utc::now()).unwrap());
        assert!(!db.get_message(id).unwrap().is_deleted);

        // Owner: soft-deleted once.
        assert!(db.revoke_message(id, "alice", Utc::now()).unwrap());
        let revoked = db.get_message(id).unwrap();
        assert!(revoked.is_deleted);
        assert_eq!(revoked.deleted_by.as_deref(), Some("alice"));
        assert!(revoked.deleted_at.is_some());

        // Second attempt hits is_deleted = 0 and reports unauthorized.
        assert!(!db.revoke_message(id, "alice", Utc::now()).unwrap());

        // Unknown id.
        assert!(!db.revoke_message(9999, "alice", Utc::now()).unwrap());
    }

    #[test]
    fn revoked_messages_leave_listings() {
        let db = test_db();
        let id = db.insert_message(&draft("alice", "gone soon")).unwrap();
        db.insert_message(&draft("bob", "stays")).unwrap();

        assert_eq!(db.list_messages(None).unwrap().len(), 2);
        db.revoke_message(id, "alice", Utc::now()).unwrap();

        let visible = db.list_messages(None).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].username, "bob");
    }

    #[test]
    fn month_filter_and_distinct_months() {
        let db = test_db();
        let mut old = draft("alice", "last year");
        old.timestamp = old.timestamp - chrono::Duration::days(400);
        old.month = month_bucket(old.timestamp);
        db.insert_message(&old).unwrap();
        db.insert_message(&draft("alice", "now a")).unwrap();
        db.insert_message(&draft("bob", "now b")).unwrap();

        let months = db.list_months().unwrap();
        assert_eq!(months.len(), 2);
        // Most recently active bucket first, each exactly once.
        assert_eq!(months[0], month_bucket(Utc::now()));

        let bucket = db.list_messages(Some(&months[0])).unwrap();
        assert_eq!(bucket.len(), 2);
        assert!(bucket.iter().all(|m| m.month == months[0]));
    }

    #[test]
    fn message_owner_not_found() {
        let db = test_db();
        assert!(matches!(db.message_owner(1), Err(StoreError::NotFound)));
    }
}
