//! Ephemeral media store and sweep.
//!
//! Uploaded blobs live on disk under the temp directory and are registered
//! in both stores with a fixed 7-day TTL.  An hourly background task
//! reclaims everything past its `expires_at`: blob, primary row, mirror
//! document.  The sweep shares no lock with ingestion — a message may
//! reference a blob for a short window after the sweep deletes it, which is
//! an accepted staleness window at this TTL granularity.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatboard_shared::constants::{
    MAX_IMAGE_UPLOAD_BYTES, MAX_VIDEO_UPLOAD_BYTES, MAX_VOICE_UPLOAD_BYTES, SWEEP_INTERVAL_SECS,
    TEMP_FILE_TTL_DAYS,
};
use chatboard_shared::models::TempFile;
use chatboard_store::MirrorJob;

use crate::error::ServerError;
use crate::state::AppState;

/// What an upload route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Video,
    Voice,
}

impl UploadKind {
    pub fn max_bytes(&self) -> usize {
        match self {
            UploadKind::Image => MAX_IMAGE_UPLOAD_BYTES,
            UploadKind::Video => MAX_VIDEO_UPLOAD_BYTES,
            UploadKind::Voice => MAX_VOICE_UPLOAD_BYTES,
        }
    }

    fn mime_prefix(&self) -> &'static str {
        match self {
            UploadKind::Image => "image/",
            UploadKind::Video => "video/",
            UploadKind::Voice => "audio/",
        }
    }
}

/// Gate an upload before anything touches storage: mime family by route,
/// then the per-route size cap.
pub fn check_upload(kind: UploadKind, content_type: &str, size: usize) -> Result<(), ServerError> {
    if !content_type.starts_with(kind.mime_prefix()) {
        return Err(ServerError::Validation(format!(
            "expected a {} upload, got '{}'",
            kind.mime_prefix().trim_end_matches('/'),
            content_type
        )));
    }
    if size > kind.max_bytes() {
        return Err(ServerError::UploadTooLarge {
            size,
            max: kind.max_bytes(),
        });
    }
    Ok(())
}

/// On-disk blob storage for ephemeral uploads.
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub async fn new(dir: PathBuf) -> Result<Self, ServerError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            ServerError::Internal(format!(
                "failed to create temp directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        info!(path = %dir.display(), "temp store initialized");

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a blob under a collision-free storage key derived from the
    /// original name.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, ServerError> {
        let filename = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_filename(original_name)
        );
        let path = self.dir.join(&filename);

        fs::write(&path, data).await.map_err(|e| {
            ServerError::Internal(format!("failed to write upload {filename}: {e}"))
        })?;

        debug!(file = %filename, size = data.len(), "stored upload");
        Ok(filename)
    }

    pub async fn remove(&self, filename: &str) -> Result<(), std::io::Error> {
        fs::remove_file(self.dir.join(filename)).await
    }
}

/// Public URL a stored blob is served back under.
pub fn blob_url(filename: &str) -> String {
    format!("/temp/{filename}")
}

/// Register an uploaded blob in both stores with the fixed TTL.  Primary
/// first; the mirror write is enqueued fire-and-forget.
pub async fn register_upload(
    state: &AppState,
    filename: String,
    original_name: String,
    file_type: String,
    size: i64,
    uploaded_by: String,
) -> Result<TempFile, ServerError> {
    let created_at = Utc::now();
    let record = TempFile {
        filename,
        original_name,
        file_type,
        size,
        uploaded_by,
        expires_at: created_at + Duration::days(TEMP_FILE_TTL_DAYS),
        created_at,
    };

    {
        let db = state.db.lock().await;
        db.insert_temp_file(&record)?;
    }
    let _ = state.mirror.send(MirrorJob::TempFile(record.clone()));

    Ok(record)
}

/// Start the hourly sweep.  The handle is held by `main` and aborted at
/// shutdown.
pub fn spawn_sweep(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        // The first tick completes immediately; skip it so the first pass
        // runs one interval after startup.
        interval.tick().await;

        info!(interval_secs = SWEEP_INTERVAL_SECS, "expired upload sweep scheduled");

        loop {
            interval.tick().await;
            match sweep_expired(&state).await {
                Ok(0) => {}
                Ok(n) => info!(deleted = n, "sweep pass finished"),
                Err(e) => warn!(error = %e, "sweep pass failed"),
            }
        }
    })
}

/// One sweep pass: for every record past its TTL, delete the blob, the
/// primary row, and (best-effort) the mirror document.  Per-file failures
/// are logged and do not abort the batch.
pub async fn sweep_expired(state: &AppState) -> Result<usize, ServerError> {
    let now = Utc::now();

    let expired = {
        let db = state.db.lock().await;
        db.expired_temp_files(now)?
    };

    let mut deleted = 0;
    for file in expired {
        if let Err(e) = state.temp_store.remove(&file.filename).await {
            // A missing blob is fine — the record is still reclaimed.
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = %file.filename, error = %e, "failed to delete expired blob");
            }
        }

        match state.db.lock().await.delete_temp_file(&file.filename) {
            Ok(_) => {
                deleted += 1;
                debug!(file = %file.filename, "deleted expired upload");
            }
            Err(e) => {
                warn!(file = %file.filename, error = %e, "failed to delete expired record");
                continue;
            }
        }

        let _ = state.mirror.send(MirrorJob::TempFileRemoved {
            filename: file.filename,
        });
    }

    Ok(deleted)
}

/// Strip an uploader-supplied name down to a safe storage suffix.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_state;

    #[test]
    fn upload_gate_checks_mime_then_size() {
        assert!(check_upload(UploadKind::Image, "image/png", 1024).is_ok());

        // 60 MB to the image route: rejected before any store write.
        let err = check_upload(UploadKind::Image, "image/jpeg", 60 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, ServerError::UploadTooLarge { .. }));

        // Same size is fine for video.
        assert!(check_upload(UploadKind::Video, "video/mp4", 60 * 1024 * 1024).is_ok());

        let err = check_upload(UploadKind::Video, "image/png", 10).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        let err = check_upload(UploadKind::Voice, "video/mp4", 10).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn filenames_are_flattened_to_safe_suffixes() {
        assert_eq!(sanitize_filename("photo.png"), "photo.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn sweep_reclaims_only_expired_uploads() {
        let (state, _dir) = test_state().await;

        let expired_name = state.temp_store.store("old.png", b"old").await.unwrap();
        let fresh_name = state.temp_store.store("new.png", b"new").await.unwrap();

        register_upload(
            &state,
            fresh_name.clone(),
            "new.png".into(),
            "image/png".into(),
            3,
            "alice".into(),
        )
        .await
        .unwrap();

        // Backdate the expired record directly.
        {
            let db = state.db.lock().await;
            db.insert_temp_file(&TempFile {
                filename: expired_name.clone(),
                original_name: "old.png".into(),
                file_type: "image/png".into(),
                size: 3,
                uploaded_by: "alice".into(),
                expires_at: Utc::now() - Duration::hours(1),
                created_at: Utc::now() - Duration::days(8),
            })
            .unwrap();
        }

        assert_eq!(sweep_expired(&state).await.unwrap(), 1);

        // Expired: blob and record both gone.
        assert!(!state.temp_store.dir().join(&expired_name).exists());
        assert!(state.db.lock().await.get_temp_file(&expired_name).is_err());

        // Fresh: survives any number of passes.
        assert_eq!(sweep_expired(&state).await.unwrap(), 0);
        assert!(state.temp_store.dir().join(&fresh_name).exists());
        assert!(state.db.lock().await.get_temp_file(&fresh_name).is_ok());
    }

    #[tokio::test]
    async fn sweep_tolerates_an_already_missing_blob() {
        let (state, _dir) = test_state().await;

        {
            let db = state.db.lock().await;
            db.insert_temp_file(&TempFile {
                filename: "vanished.png".into(),
                original_name: "vanished.png".into(),
                file_type: "image/png".into(),
                size: 1,
                uploaded_by: "alice".into(),
                expires_at: Utc::now() - Duration::hours(1),
                created_at: Utc::now() - Duration::days(8),
            })
            .unwrap();
        }

        // No blob on disk, but the record is still reclaimed.
        assert_eq!(sweep_expired(&state).await.unwrap(), 1);
        assert!(state.db.lock().await.get_temp_file("vanished.png").is_err());
    }
}
