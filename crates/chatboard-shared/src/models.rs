//! Domain model structs persisted in the primary store and mirrored to the
//! secondary store.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names so it can be handed directly to browser clients over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Media type of a board message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Voice,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "video" => Some(MessageKind::Video),
            "voice" => Some(MessageKind::Voice),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single board message.  For media messages `content` holds the blob URL.
///
/// `id` is assigned by the primary store and never reused.  `is_deleted`
/// transitions false→true exactly once, only by the original author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub username: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    /// Calendar bucket the message belongs to, see [`crate::month`].
    pub month: String,
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Voice message length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

/// Message fields known before the primary store assigns an id.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub username: String,
    pub content: String,
    pub kind: MessageKind,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    pub month: String,
    pub duration: Option<i64>,
    pub file_size: Option<i64>,
}

impl MessageDraft {
    /// Promote the draft to a full record once the primary store has
    /// assigned its id.
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            username: self.username,
            content: self.content,
            kind: self.kind,
            ip: self.ip,
            timestamp: self.timestamp,
            month: self.month,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            duration: self.duration,
            file_size: self.file_size,
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Away => "away",
            UserStatus::Busy => "busy",
            UserStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(UserStatus::Online),
            "away" => Some(UserStatus::Away),
            "busy" => Some(UserStatus::Busy),
            "offline" => Some(UserStatus::Offline),
            _ => None,
        }
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        UserStatus::Online
    }
}

/// A known board user.  The primary key is the username; rows are upserted
/// idempotently on every join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub ip: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
}

// ---------------------------------------------------------------------------
// TempFile
// ---------------------------------------------------------------------------

/// Metadata for an uploaded ephemeral blob.  Created at upload time with a
/// fixed TTL and destroyed by the sweep once `expires_at` has passed; there
/// is no renewal mechanism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TempFile {
    /// Storage key — the on-disk name under the upload directory.
    pub filename: String,
    pub original_name: String,
    /// Mime type as declared by the uploader.
    pub file_type: String,
    pub size: i64,
    pub uploaded_by: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// An in-app notification row.  `is_read` moves false→true once and only
/// via the mark-read operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    /// Recipient username (consumers filter client-side).
    pub username: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_shape_is_camel_case() {
        let msg = MessageDraft {
            username: "alice".into(),
            content: "hello".into(),
            kind: MessageKind::Text,
            ip: "127.0.0.1".into(),
            timestamp: Utc::now(),
            month: "July 2025".into(),
            duration: None,
            file_size: None,
        }
        .into_message(1);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["type"], "text");
        assert_eq!(json["isDeleted"], false);
        // Unset optional fields stay off the wire entirely.
        assert!(json.get("deletedBy").is_none());
        assert!(json.get("fileSize").is_none());
    }

    #[test]
    fn message_kind_round_trip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Video,
            MessageKind::Voice,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("gif"), None);
    }

    #[test]
    fn user_status_defaults_to_online() {
        let user: User =
            serde_json::from_str(r#"{"username":"a","ip":"x","joinedAt":"2025-07-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(user.status, UserStatus::Online);
    }
}
