use chrono::{DateTime, Utc};
use rusqlite::params;

use chatboard_shared::models::{User, UserStatus};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Idempotent upsert keyed by username, performed on every join.  A
    /// returning user keeps their profile fields; only the address is
    /// refreshed.
    pub fn upsert_user(&self, username: &str, ip: &str, joined_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (username, ip, joined_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET ip = excluded.ip",
            params![username, ip, joined_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT username, ip, joined_at, avatar, bio, status
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Overwrite the editable profile fields.  Returns whether the user
    /// exists.
    pub fn update_profile(
        &self,
        username: &str,
        avatar: Option<&str>,
        bio: Option<&str>,
        status: UserStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET avatar = ?2, bio = ?3, status = ?4 WHERE username = ?1",
            params![username, avatar, bio, status.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT username, ip, joined_at, avatar, bio, status
             FROM users ORDER BY joined_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let joined_str: String = row.get(2)?;
    let joined_at = DateTime::parse_from_rfc3339(&joined_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let status_str: String = row.get(5)?;

    Ok(User {
        username: row.get(0)?,
        ip: row.get(1)?,
        joined_at,
        avatar: row.get(3)?,
        bio: row.get(4)?,
        status: UserStatus::parse(&status_str).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent_and_keeps_profile() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user("alice", "10.0.0.1", Utc::now()).unwrap();
        db.update_profile("alice", Some("a.png"), Some("hi"), UserStatus::Busy)
            .unwrap();

        // Rejoin from a new address.
        db.upsert_user("alice", "10.0.0.2", Utc::now()).unwrap();

        let user = db.get_user("alice").unwrap();
        assert_eq!(user.ip, "10.0.0.2");
        assert_eq!(user.avatar.as_deref(), Some("a.png"));
        assert_eq!(user.status, UserStatus::Busy);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn update_profile_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db
            .update_profile("ghost", None, None, UserStatus::Online)
            .unwrap());
    }
}
