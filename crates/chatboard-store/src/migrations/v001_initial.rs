//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `messages`, `users`, `temp_files`, and
//! `notifications`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    username   TEXT NOT NULL,
    content    TEXT NOT NULL,
    type       TEXT NOT NULL DEFAULT 'text',
    ip         TEXT NOT NULL,
    timestamp  TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    month      TEXT NOT NULL,                -- bucket label, filter key
    is_deleted INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    deleted_by TEXT,
    deleted_at TEXT,
    duration   INTEGER,                      -- voice messages, seconds
    file_size  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_messages_month ON messages(month);
CREATE INDEX IF NOT EXISTS idx_messages_username ON messages(username);

-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username  TEXT PRIMARY KEY NOT NULL,
    ip        TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    avatar    TEXT,
    bio       TEXT,
    status    TEXT NOT NULL DEFAULT 'online'
);

-- ----------------------------------------------------------------
-- Temp files (ephemeral upload metadata)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS temp_files (
    filename      TEXT PRIMARY KEY NOT NULL,  -- storage key on disk
    original_name TEXT NOT NULL,
    file_type     TEXT NOT NULL,
    size          INTEGER NOT NULL,
    uploaded_by   TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_temp_files_expires_at ON temp_files(expires_at);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    username   TEXT NOT NULL,
    message    TEXT NOT NULL,
    type       TEXT NOT NULL DEFAULT 'info',
    is_read    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_created
    ON notifications(username, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
