//! Realtime gateway.
//!
//! Each WebSocket connection gets an outbound queue registered with the
//! presence registry and a read loop that dispatches client events into the
//! pipeline.  Events from one connection are processed in submission order;
//! ordering across connections is whatever order primary writes complete
//! in.

use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use chatboard_shared::models::MessageKind;
use chatboard_shared::protocol::{ClientEvent, ServerEvent};

use crate::error::ServerError;
use crate::pipeline::{self, IncomingMessage};
use crate::presence::{ConnId, PeerIdentity};
use crate::state::AppState;

/// Client address, honoring a reverse proxy's `X-Forwarded-For` if present.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let ip = client_ip(&headers, peer);
    ws.on_upgrade(move |socket| handle_socket(state, socket, ip))
}

async fn handle_socket(state: AppState, socket: WebSocket, ip: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let conn_id = state.presence.register(tx).await;
    debug!(%conn_id, %ip, "client connected");

    // Writer half: drain the outbound queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader half: dispatch frames in submission order.
    while let Some(Ok(frame)) = ws_rx.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        match ClientEvent::from_json(&text) {
            Ok(event) => dispatch(&state, conn_id, &ip, event).await,
            Err(e) => debug!(%conn_id, error = %e, "ignoring malformed frame"),
        }
    }

    // Disconnect: free the slot and, if this connection had joined,
    // rebroadcast the shrunken roster.
    if state.presence.remove(conn_id).await {
        let roster = state.presence.roster().await;
        state
            .presence
            .broadcast(&ServerEvent::UsersOnline(roster))
            .await;
    }
    writer.abort();
    debug!(%conn_id, "client disconnected");
}

async fn dispatch(state: &AppState, conn_id: ConnId, ip: &str, event: ClientEvent) {
    match event {
        ClientEvent::Join(payload) => handle_join(state, conn_id, ip, payload.username).await,

        ClientEvent::Message(p) => {
            ingest(
                state,
                conn_id,
                IncomingMessage {
                    username: p.username,
                    content: p.content,
                    kind: MessageKind::Text,
                    duration: None,
                    file_size: None,
                },
            )
            .await
        }
        ClientEvent::ImageMessage(p) => {
            ingest(
                state,
                conn_id,
                IncomingMessage {
                    username: p.username,
                    content: p.image_url,
                    kind: MessageKind::Image,
                    duration: None,
                    file_size: None,
                },
            )
            .await
        }
        ClientEvent::VideoMessage(p) => {
            ingest(
                state,
                conn_id,
                IncomingMessage {
                    username: p.username,
                    content: p.video_url,
                    kind: MessageKind::Video,
                    duration: None,
                    file_size: p.file_size,
                },
            )
            .await
        }
        ClientEvent::VoiceMessage(p) => {
            ingest(
                state,
                conn_id,
                IncomingMessage {
                    username: p.username,
                    content: p.voice_url,
                    kind: MessageKind::Voice,
                    duration: p.duration,
                    file_size: p.file_size,
                },
            )
            .await
        }

        ClientEvent::RevokeMessage(p) => {
            match pipeline::revoke(state, p.message_id, &p.username).await {
                Ok(()) => {}
                // Denials are surfaced to the requester explicitly, the
                // same signal the HTTP entry point gives as a 403.
                Err(ServerError::RevokeDenied) => {
                    state
                        .presence
                        .send_to(
                            conn_id,
                            &ServerEvent::Error {
                                message: ServerError::RevokeDenied.to_string(),
                            },
                        )
                        .await;
                }
                Err(e) => error!(%conn_id, message_id = p.message_id, error = %e, "revoke failed"),
            }
        }
    }
}

async fn handle_join(state: &AppState, conn_id: ConnId, ip: &str, username: String) {
    if username.trim().is_empty() {
        warn!(%conn_id, "join without username ignored");
        return;
    }

    let identified = state
        .presence
        .identify(
            conn_id,
            PeerIdentity {
                username: username.clone(),
                ip: ip.to_string(),
            },
        )
        .await;
    if !identified {
        return;
    }
    debug!(%conn_id, %username, "client joined");

    // Upsert the user row; a store failure must not cost the live session.
    if let Err(e) = pipeline::register_user(state, &username, ip).await {
        error!(%username, error = %e, "failed to persist joining user");
    }

    state
        .presence
        .broadcast_except(conn_id, &ServerEvent::UserJoined { username })
        .await;
    let roster = state.presence.roster().await;
    state
        .presence
        .broadcast(&ServerEvent::UsersOnline(roster))
        .await;
}

/// Realtime ingestion: failures are logged server-side and the event is
/// dropped — no error is delivered back for the message paths.
async fn ingest(state: &AppState, conn_id: ConnId, incoming: IncomingMessage) {
    if let Err(e) = pipeline::ingest(state, conn_id, incoming).await {
        warn!(%conn_id, error = %e, "message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_wins_over_peer_addr() {
        let peer: SocketAddr = "10.1.2.3:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "10.1.2.3");

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "203.0.113.9");
    }
}
