//! Best-effort secondary store.
//!
//! The mirror keeps document collections on disk — one JSON file per record
//! — shadowing the primary tables.  It is written by a dedicated
//! fire-and-forget task and is never read back by the server: divergence
//! from the primary is accepted and permanent, and every failure here is
//! logged and swallowed.  Documents omit the primary-assigned id (it only
//! appears as the file key).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use chatboard_shared::models::{Message, MessageKind, Notification, TempFile, User};

use crate::error::MirrorError;

const COLLECTIONS: [&str; 4] = ["messages", "users", "temp_files", "notifications"];

/// One replication job, enqueued by the pipeline after a primary write.
#[derive(Debug, Clone)]
pub enum MirrorJob {
    Message { id: i64, message: Message },
    MessageRevoked {
        id: i64,
        deleted_by: String,
        deleted_at: DateTime<Utc>,
    },
    User(User),
    TempFile(TempFile),
    TempFileRemoved { filename: String },
    Notification(Notification),
    NotificationRead { id: i64 },
}

/// Handle to the mirror's document tree.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

/// A message document as mirrored — same fields, minus the id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageDoc<'a> {
    username: &'a str,
    content: &'a str,
    #[serde(rename = "type")]
    kind: MessageKind,
    ip: &'a str,
    timestamp: DateTime<Utc>,
    month: &'a str,
    is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_by: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<i64>,
}

impl<'a> From<&'a Message> for MessageDoc<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            username: &m.username,
            content: &m.content,
            kind: m.kind,
            ip: &m.ip,
            timestamp: m.timestamp,
            month: &m.month,
            is_deleted: m.is_deleted,
            deleted_by: m.deleted_by.as_deref(),
            deleted_at: m.deleted_at,
            duration: m.duration,
            file_size: m.file_size,
        }
    }
}

/// A notification document as mirrored — same fields, minus the id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationDoc<'a> {
    username: &'a str,
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl MirrorStore {
    /// Open (or create) the mirror's collection directories.
    pub async fn open(root: PathBuf) -> Result<Self, MirrorError> {
        for collection in COLLECTIONS {
            tokio::fs::create_dir_all(root.join(collection)).await?;
        }
        tracing::info!(path = %root.display(), "mirror store initialized");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply one replication job.
    pub async fn apply(&self, job: &MirrorJob) -> Result<(), MirrorError> {
        match job {
            MirrorJob::Message { id, message } => {
                self.write_doc("messages", &id.to_string(), &MessageDoc::from(message))
                    .await
            }
            MirrorJob::MessageRevoked {
                id,
                deleted_by,
                deleted_at,
            } => {
                self.update_doc("messages", &id.to_string(), |doc| {
                    doc.insert("isDeleted".into(), Value::Bool(true));
                    doc.insert("deletedBy".into(), Value::String(deleted_by.clone()));
                    doc.insert(
                        "deletedAt".into(),
                        Value::String(deleted_at.to_rfc3339()),
                    );
                })
                .await
            }
            MirrorJob::User(user) => {
                self.write_doc("users", &sanitize_key(&user.username), user)
                    .await
            }
            MirrorJob::TempFile(file) => {
                self.write_doc("temp_files", &sanitize_key(&file.filename), file)
                    .await
            }
            MirrorJob::TempFileRemoved { filename } => {
                self.remove_doc("temp_files", &sanitize_key(filename)).await
            }
            MirrorJob::Notification(n) => {
                let doc = NotificationDoc {
                    username: &n.username,
                    message: &n.message,
                    kind: &n.kind,
                    is_read: n.is_read,
                    created_at: n.created_at,
                };
                self.write_doc("notifications", &n.id.to_string(), &doc).await
            }
            MirrorJob::NotificationRead { id } => {
                self.update_doc("notifications", &id.to_string(), |doc| {
                    doc.insert("isRead".into(), Value::Bool(true));
                })
                .await
            }
        }
    }

    fn doc_path(&self, collection: &str, key: &str) -> PathBuf {
        self.root.join(collection).join(format!("{key}.json"))
    }

    async fn write_doc<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        doc: &T,
    ) -> Result<(), MirrorError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(self.doc_path(collection, key), bytes).await?;
        Ok(())
    }

    async fn update_doc(
        &self,
        collection: &str,
        key: &str,
        mutate: impl FnOnce(&mut serde_json::Map<String, Value>),
    ) -> Result<(), MirrorError> {
        let path = self.doc_path(collection, key);
        let bytes = tokio::fs::read(&path).await?;
        let mut value: Value = serde_json::from_slice(&bytes)?;
        if let Some(doc) = value.as_object_mut() {
            mutate(doc);
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(&value)?).await?;
        Ok(())
    }

    async fn remove_doc(&self, collection: &str, key: &str) -> Result<(), MirrorError> {
        tokio::fs::remove_file(self.doc_path(collection, key)).await?;
        Ok(())
    }
}

/// Spawn the replication writer.  Jobs sent on the returned channel are
/// applied in order; failures are logged and never reach the sender.
pub fn spawn_mirror_writer(store: MirrorStore) -> mpsc::UnboundedSender<MirrorJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<MirrorJob>();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if let Err(e) = store.apply(&job).await {
                tracing::warn!(error = %e, ?job, "mirror write failed");
            }
        }
        tracing::debug!("mirror writer stopped");
    });

    tx
}

/// Document file names come from user-influenced strings; keep them to a
/// safe character set.
fn sanitize_key(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatboard_shared::models::MessageDraft;
    use chatboard_shared::month::month_bucket;

    fn message(id: i64) -> Message {
        let timestamp = Utc::now();
        MessageDraft {
            username: "alice".into(),
            content: "hello".into(),
            kind: MessageKind::Text,
            ip: "127.0.0.1".into(),
            month: month_bucket(timestamp),
            timestamp,
            duration: None,
            file_size: None,
        }
        .into_message(id)
    }

    #[tokio::test]
    async fn message_doc_omits_id_and_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = MirrorStore::open(dir.path().to_path_buf()).await.unwrap();

        mirror
            .apply(&MirrorJob::Message { id: 7, message: message(7) })
            .await
            .unwrap();

        let raw = std::fs::read(dir.path().join("messages/7.json")).unwrap();
        let doc: Value = serde_json::from_slice(&raw).unwrap();
        assert!(doc.get("id").is_none());
        assert_eq!(doc["username"], "alice");
        assert_eq!(doc["isDeleted"], false);

        mirror
            .apply(&MirrorJob::MessageRevoked {
                id: 7,
                deleted_by: "alice".into(),
                deleted_at: Utc::now(),
            })
            .await
            .unwrap();

        let raw = std::fs::read(dir.path().join("messages/7.json")).unwrap();
        let doc: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc["isDeleted"], true);
        assert_eq!(doc["deletedBy"], "alice");
    }

    #[tokio::test]
    async fn updating_a_missing_doc_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = MirrorStore::open(dir.path().to_path_buf()).await.unwrap();

        let result = mirror
            .apply(&MirrorJob::NotificationRead { id: 123 })
            .await;
        assert!(matches!(result, Err(MirrorError::Io(_))));
    }

    #[test]
    fn keys_are_path_safe() {
        assert_eq!(sanitize_key("alice"), "alice");
        assert_eq!(sanitize_key("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_key(""), "_");
    }
}
