//! Notification fan-out.
//!
//! In-app notifications are persisted to the primary store, mirrored
//! best-effort, and broadcast to every connection; the consuming client
//! filters by recipient.  Mark-read is a one-way flip with no broadcast.
//! The short per-message preview broadcast alongside new messages is also
//! derived here.

use chrono::Utc;

use chatboard_shared::constants::PREVIEW_MAX_CHARS;
use chatboard_shared::models::{Message, MessageKind, Notification};
use chatboard_shared::protocol::{MessagePreview, ServerEvent};
use chatboard_store::MirrorJob;

use crate::error::ServerError;
use crate::state::AppState;

/// Persist a notification, mirror it, and broadcast `notification-received`.
pub async fn send_notification(
    state: &AppState,
    username: &str,
    message: &str,
    kind: &str,
) -> Result<Notification, ServerError> {
    if username.is_empty() || message.is_empty() {
        return Err(ServerError::Validation(
            "username and message required".into(),
        ));
    }

    let created_at = Utc::now();
    let id = {
        let db = state.db.lock().await;
        db.insert_notification(username, message, kind, created_at)?
    };

    let notification = Notification {
        id,
        username: username.to_string(),
        message: message.to_string(),
        kind: kind.to_string(),
        is_read: false,
        created_at,
    };

    let _ = state
        .mirror
        .send(MirrorJob::Notification(notification.clone()));

    state
        .presence
        .broadcast(&ServerEvent::NotificationReceived(notification.clone()))
        .await;

    Ok(notification)
}

/// Flip `is_read`.  Idempotent, no broadcast; an unknown id is a no-op,
/// matching the pull-once-then-mark flow clients use on reconnect.
pub async fn mark_read(state: &AppState, id: i64) -> Result<(), ServerError> {
    {
        let db = state.db.lock().await;
        db.mark_notification_read(id)?;
    }
    let _ = state.mirror.send(MirrorJob::NotificationRead { id });
    Ok(())
}

/// Derive the short preview broadcast with every new message: a truncated
/// excerpt for text, a fixed phrase for media.
pub fn message_preview(message: &Message) -> MessagePreview {
    let text = match message.kind {
        MessageKind::Text => format!("{}: {}", message.username, excerpt(&message.content)),
        MessageKind::Image => format!("{} sent a photo", message.username),
        MessageKind::Video => format!("{} sent a video", message.username),
        MessageKind::Voice => format!("{} sent a voice message", message.username),
    };

    MessagePreview {
        from: message.username.clone(),
        message: text,
        kind: message.kind,
        timestamp: message.timestamp,
    }
}

/// Character-based truncation — media URLs and multi-byte text must never
/// split inside a code point.
fn excerpt(content: &str) -> String {
    if content.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_state;
    use chatboard_shared::models::MessageDraft;
    use chatboard_shared::month::month_bucket;

    fn message_of(kind: MessageKind, content: &str) -> Message {
        let timestamp = Utc::now();
        MessageDraft {
            username: "alice".into(),
            content: content.into(),
            kind,
            ip: "127.0.0.1".into(),
            month: month_bucket(timestamp),
            timestamp,
            duration: None,
            file_size: None,
        }
        .into_message(1)
    }

    #[test]
    fn text_preview_truncates_at_fifty_chars() {
        let long = "x".repeat(80);
        let preview = message_preview(&message_of(MessageKind::Text, &long));
        assert_eq!(preview.message, format!("alice: {}...", "x".repeat(50)));

        let short = message_preview(&message_of(MessageKind::Text, "hi"));
        assert_eq!(short.message, "alice: hi");
    }

    #[test]
    fn truncation_is_character_based() {
        let content = "é".repeat(60);
        let preview = message_preview(&message_of(MessageKind::Text, &content));
        assert_eq!(preview.message, format!("alice: {}...", "é".repeat(50)));
    }

    #[test]
    fn media_previews_use_fixed_phrases() {
        for (kind, phrase) in [
            (MessageKind::Image, "alice sent a photo"),
            (MessageKind::Video, "alice sent a video"),
            (MessageKind::Voice, "alice sent a voice message"),
        ] {
            let preview = message_preview(&message_of(kind, "/temp/x"));
            assert_eq!(preview.message, phrase);
            assert_eq!(preview.kind, kind);
        }
    }

    #[tokio::test]
    async fn notification_fan_out_and_idempotent_read() {
        let (state, _dir) = test_state().await;
        let (_conn, mut rx) = crate::pipeline::tests::join(&state, "bob").await;

        let notification = send_notification(&state, "alice", "welcome", "info")
            .await
            .unwrap();
        assert_eq!(notification.id, 1);
        assert!(!notification.is_read);

        // Broadcast goes to every connection; clients filter by recipient.
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("notification-received"));
        assert!(frame.contains("welcome"));

        mark_read(&state, notification.id).await.unwrap();
        mark_read(&state, notification.id).await.unwrap();
        let backlog = state
            .db
            .lock()
            .await
            .notifications_for("alice", 50)
            .unwrap();
        assert!(backlog[0].is_read);

        // Unknown ids are a quiet no-op.
        mark_read(&state, 999).await.unwrap();
    }

    #[tokio::test]
    async fn notification_requires_recipient_and_body() {
        let (state, _dir) = test_state().await;
        assert!(send_notification(&state, "", "hi", "info").await.is_err());
        assert!(send_notification(&state, "alice", "", "info").await.is_err());
    }
}
