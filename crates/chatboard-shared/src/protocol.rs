//! Wire protocol for the realtime channel.
//!
//! Frames are JSON text of the form `{"event": "...", "data": {...}}`,
//! matching what browser clients expect.  Client→server and server→client
//! events are separate enums; both round-trip through [`serde_json`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageKind, Notification, UserStatus};

/// Events a client sends over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce identity for this connection.  Must precede any message.
    Join(JoinPayload),
    /// Plain text message.
    Message(TextMessagePayload),
    ImageMessage(ImageMessagePayload),
    VideoMessage(VideoMessagePayload),
    VoiceMessage(VoiceMessagePayload),
    /// Request soft-deletion of the sender's own message.
    RevokeMessage(RevokePayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextMessagePayload {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMessagePayload {
    pub username: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMessagePayload {
    pub username: String,
    pub video_url: String,
    #[serde(default)]
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMessagePayload {
    pub username: String,
    pub voice_url: String,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevokePayload {
    pub message_id: i64,
    pub username: String,
}

/// Events the server broadcasts (or addresses to one connection).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The fully stamped record as committed to the primary store.
    NewMessage(Message),
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: i64 },
    UserJoined { username: String },
    /// Full roster of identified connections, re-sent on every change.
    UsersOnline(Vec<PeerPresence>),
    NotificationReceived(Notification),
    MessageNotification(MessagePreview),
    #[serde(rename_all = "camelCase")]
    BackgroundUpdated { image_data: String },
    BackgroundRemoved,
    ProfileUpdated(ProfileUpdate),
    /// Explicit failure signal addressed to the requesting connection.
    Error { message: String },
}

/// One identified connection as shown in the online roster.  Keyed per
/// connection — the same user on two connections appears twice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerPresence {
    pub username: String,
    pub ip: String,
}

/// Short activity summary broadcast alongside every new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub from: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub status: UserStatus,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_parses_kebab_case_tags() {
        let frame = r#"{"event":"voice-message","data":{"username":"alice","voiceUrl":"/temp/a.ogg","duration":12}}"#;
        let event = ClientEvent::from_json(frame).unwrap();
        match event {
            ClientEvent::VoiceMessage(p) => {
                assert_eq!(p.username, "alice");
                assert_eq!(p.duration, Some(12));
                assert_eq!(p.file_size, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn server_event_round_trip() {
        let event = ServerEvent::MessageDeleted { message_id: 42 };
        let json = event.to_json().unwrap();
        assert_eq!(json, r#"{"event":"message-deleted","data":{"messageId":42}}"#);
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_variant_has_no_data() {
        let json = ServerEvent::BackgroundRemoved.to_json().unwrap();
        assert_eq!(json, r#"{"event":"background-removed"}"#);
    }
}
