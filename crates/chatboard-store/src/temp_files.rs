use chrono::{DateTime, Utc};
use rusqlite::params;

use chatboard_shared::models::TempFile;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn insert_temp_file(&self, file: &TempFile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO temp_files (filename, original_name, file_type, size, uploaded_by, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file.filename,
                file.original_name,
                file.file_type,
                file.size,
                file.uploaded_by,
                file.expires_at.to_rfc3339(),
                file.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_temp_file(&self, filename: &str) -> Result<TempFile> {
        self.conn()
            .query_row(
                "SELECT filename, original_name, file_type, size, uploaded_by, expires_at, created_at
                 FROM temp_files WHERE filename = ?1",
                params![filename],
                row_to_temp_file,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Upload records whose TTL has elapsed — the sweep's work list.
    pub fn expired_temp_files(&self, now: DateTime<Utc>) -> Result<Vec<TempFile>> {
        let mut stmt = self.conn().prepare(
            "SELECT filename, original_name, file_type, size, uploaded_by, expires_at, created_at
             FROM temp_files WHERE expires_at < ?1",
        )?;

        let rows = stmt.query_map(params![now.to_rfc3339()], row_to_temp_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    // only removes the db record, not the blob on disk
    pub fn delete_temp_file(&self, filename: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM temp_files WHERE filename = ?1",
            params![filename],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_temp_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<TempFile> {
    let expires_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;

    let expires_at = parse_ts(5, &expires_str)?;
    let created_at = parse_ts(6, &created_str)?;

    Ok(TempFile {
        filename: row.get(0)?,
        original_name: row.get(1)?,
        file_type: row.get(2)?,
        size: row.get(3)?,
        uploaded_by: row.get(4)?,
        expires_at,
        created_at,
    })
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
