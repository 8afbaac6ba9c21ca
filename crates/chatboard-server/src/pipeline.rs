//! Message ingestion and revocation.
//!
//! The pipeline is the only write path for messages.  Its contract: the
//! primary insert is the single gate for visibility — nothing is mirrored,
//! broadcast, or relayed until the primary store has returned the assigned
//! id.  The mirror write that follows is enqueued fire-and-forget.

use chrono::Utc;
use tracing::{debug, info};

use chatboard_shared::models::{Message, MessageDraft, MessageKind};
use chatboard_shared::month::month_bucket;
use chatboard_shared::protocol::ServerEvent;
use chatboard_store::MirrorJob;

use crate::error::ServerError;
use crate::notify;
use crate::presence::ConnId;
use crate::relay::ActivityKind;
use crate::state::AppState;

/// A payload from the realtime channel, uniform across media types.  For
/// media messages `content` is the uploaded blob URL.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub username: String,
    pub content: String,
    pub kind: MessageKind,
    pub duration: Option<i64>,
    pub file_size: Option<i64>,
}

/// Ingest one message: validate, stamp, persist, broadcast, notify.
///
/// The sender must have joined on this connection; the stored `ip` is the
/// one captured at join time.  On a primary-store failure the message is
/// simply lost from the sender's perspective — logged server-side, nothing
/// delivered back over the realtime channel.
pub async fn ingest(
    state: &AppState,
    conn_id: ConnId,
    incoming: IncomingMessage,
) -> Result<Message, ServerError> {
    if incoming.content.trim().is_empty() {
        return Err(ServerError::Validation("empty message content".into()));
    }
    let identity = state
        .presence
        .identity(conn_id)
        .await
        .ok_or_else(|| ServerError::Validation("connection has not joined".into()))?;

    let timestamp = Utc::now();
    let draft = MessageDraft {
        username: incoming.username,
        content: incoming.content,
        kind: incoming.kind,
        ip: identity.ip,
        month: month_bucket(timestamp),
        timestamp,
        duration: incoming.duration,
        file_size: incoming.file_size,
    };

    // Primary write: the visibility gate.
    let id = {
        let db = state.db.lock().await;
        db.insert_message(&draft)?
    };
    let message = draft.into_message(id);
    info!(id, username = %message.username, kind = %message.kind, "message persisted");

    // Secondary write: enqueued, never awaited.
    if state
        .mirror
        .send(MirrorJob::Message { id, message: message.clone() })
        .is_err()
    {
        tracing::warn!(id, "mirror writer gone, skipping replication");
    }

    // Fan out the committed record, then the short preview.
    state
        .presence
        .broadcast(&ServerEvent::NewMessage(message.clone()))
        .await;
    state
        .presence
        .broadcast(&ServerEvent::MessageNotification(notify::message_preview(
            &message,
        )))
        .await;

    state
        .relay
        .notify_activity(ActivityKind::Message, &message.username, &message.ip);

    Ok(message)
}

/// Revoke (soft-delete) a message on behalf of `username`.
///
/// Authorization and update happen in one conditional statement; the
/// rows-affected count is the authorization signal.  Both transports
/// surface a denial explicitly — HTTP as 403, the realtime path as an
/// `error` event to the requester.
pub async fn revoke(state: &AppState, message_id: i64, username: &str) -> Result<(), ServerError> {
    let deleted_at = Utc::now();

    let revoked = {
        let db = state.db.lock().await;
        db.revoke_message(message_id, username, deleted_at)?
    };
    if !revoked {
        debug!(message_id, username, "revoke denied");
        return Err(ServerError::RevokeDenied);
    }
    info!(message_id, username, "message revoked");

    let _ = state.mirror.send(MirrorJob::MessageRevoked {
        id: message_id,
        deleted_by: username.to_string(),
        deleted_at,
    });

    state
        .presence
        .broadcast(&ServerEvent::MessageDeleted { message_id })
        .await;

    Ok(())
}

/// Upsert a user row (idempotent by username) and forward the activity to
/// the relay.  Shared by the HTTP registration endpoint and the realtime
/// join path.
pub async fn register_user(state: &AppState, username: &str, ip: &str) -> Result<(), ServerError> {
    if username.trim().is_empty() {
        return Err(ServerError::Validation("username required".into()));
    }

    let user = {
        let db = state.db.lock().await;
        db.upsert_user(username, ip, Utc::now())?;
        db.get_user(username)?
    };

    let _ = state.mirror.send(MirrorJob::User(user));
    state.relay.notify_activity(ActivityKind::User, username, ip);

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::{mpsc, Mutex};

    use chatboard_store::{spawn_mirror_writer, Database, MirrorStore};

    use crate::config::ServerConfig;
    use crate::media::TempStore;
    use crate::presence::{PeerIdentity, Presence};
    use crate::relay::ActivityRelay;

    /// Build a fully wired state on scratch storage.
    pub(crate) async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let mirror_store = MirrorStore::open(dir.path().join("mirror")).await.unwrap();
        let temp_store = TempStore::new(dir.path().join("temp")).await.unwrap();

        let config = ServerConfig {
            db_path: dir.path().join("test.db"),
            mirror_path: dir.path().join("mirror"),
            temp_dir: dir.path().join("temp"),
            background_path: dir.path().join("background.dat"),
            ..ServerConfig::default()
        };

        let state = AppState {
            db: Arc::new(Mutex::new(db)),
            mirror: spawn_mirror_writer(mirror_store),
            presence: Arc::new(Presence::new()),
            temp_store: Arc::new(temp_store),
            relay: Arc::new(ActivityRelay::disabled()),
            config: Arc::new(config),
        };
        (state, dir)
    }

    pub(crate) async fn join(
        state: &AppState,
        username: &str,
    ) -> (crate::presence::ConnId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.presence.register(tx).await;
        state
            .presence
            .identify(
                id,
                PeerIdentity {
                    username: username.into(),
                    ip: "127.0.0.1".into(),
                },
            )
            .await;
        (id, rx)
    }

    fn text_message(username: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            username: username.into(),
            content: content.into(),
            kind: MessageKind::Text,
            duration: None,
            file_size: None,
        }
    }

    #[tokio::test]
    async fn broadcast_reflects_the_committed_record() {
        let (state, _dir) = test_state().await;
        let (alice, mut rx) = join(&state, "alice").await;

        let message = ingest(&state, alice, text_message("alice", "hello"))
            .await
            .unwrap();
        assert_eq!(message.id, 1);
        assert_eq!(message.kind, MessageKind::Text);

        // First frame: the full stamped record, byte-identical fields.
        let frame = rx.recv().await.unwrap();
        let event: ServerEvent = serde_json::from_str(&frame).unwrap();
        match event {
            ServerEvent::NewMessage(broadcast) => {
                let stored = state.db.lock().await.get_message(message.id).unwrap();
                assert_eq!(broadcast, stored);
                assert_eq!(broadcast.month, stored.month);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Second frame: the preview.
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("message-notification"));
        assert!(frame.contains("alice"));
    }

    #[tokio::test]
    async fn ingest_requires_join_and_content() {
        let (state, _dir) = test_state().await;

        // Unidentified connection.
        let (tx, _rx) = mpsc::unbounded_channel();
        let stranger = state.presence.register(tx).await;
        let err = ingest(&state, stranger, text_message("x", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        // Empty content never reaches the store.
        let (alice, _rx) = join(&state, "alice").await;
        let err = ingest(&state, alice, text_message("alice", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        assert!(state.db.lock().await.list_messages(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoke_scenario_owner_only() {
        let (state, _dir) = test_state().await;
        let (alice, mut rx_alice) = join(&state, "alice").await;
        let (_bob, mut rx_bob) = join(&state, "bob").await;

        let message = ingest(&state, alice, text_message("alice", "hello"))
            .await
            .unwrap();
        assert_eq!(message.id, 1);
        // Drain the ingest frames.
        while rx_bob.try_recv().is_ok() {}
        while rx_alice.try_recv().is_ok() {}

        // Bob cannot revoke alice's message; nothing is broadcast.
        let err = revoke(&state, message.id, "bob").await.unwrap_err();
        assert!(matches!(err, ServerError::RevokeDenied));
        assert!(rx_bob.try_recv().is_err());
        assert!(!state.db.lock().await.get_message(1).unwrap().is_deleted);

        // Alice can, and every client hears about it.
        revoke(&state, message.id, "alice").await.unwrap();
        let frame = rx_bob.recv().await.unwrap();
        assert_eq!(
            frame,
            r#"{"event":"message-deleted","data":{"messageId":1}}"#
        );
        assert!(rx_alice.recv().await.unwrap().contains("message-deleted"));
    }

    #[tokio::test]
    async fn voice_message_keeps_duration_and_size() {
        let (state, _dir) = test_state().await;
        let (alice, _rx) = join(&state, "alice").await;

        let message = ingest(
            &state,
            alice,
            IncomingMessage {
                username: "alice".into(),
                content: "/temp/123-clip.ogg".into(),
                kind: MessageKind::Voice,
                duration: Some(12),
                file_size: Some(34_567),
            },
        )
        .await
        .unwrap();

        let stored = state.db.lock().await.get_message(message.id).unwrap();
        assert_eq!(stored.duration, Some(12));
        assert_eq!(stored.file_size, Some(34_567));
        assert_eq!(stored.kind, MessageKind::Voice);
    }

    #[tokio::test]
    async fn register_user_is_idempotent() {
        let (state, _dir) = test_state().await;
        register_user(&state, "alice", "10.0.0.1").await.unwrap();
        register_user(&state, "alice", "10.0.0.2").await.unwrap();

        let user = state.db.lock().await.get_user("alice").unwrap();
        assert_eq!(user.ip, "10.0.0.2");

        let err = register_user(&state, "  ", "10.0.0.1").await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }
}
