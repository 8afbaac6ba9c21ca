//! Connection registry.
//!
//! Tracks every live realtime connection and, once it has joined, its
//! identity.  The registry is keyed by connection, not by user: the same
//! username on two connections occupies two slots and is counted twice.
//! State is process-lifetime only — empty at startup and after every
//! restart.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use chatboard_shared::protocol::{PeerPresence, ServerEvent};

pub type ConnId = Uuid;

/// Identity a connection announced with its join event.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub username: String,
    pub ip: String,
}

struct Slot {
    tx: mpsc::UnboundedSender<String>,
    identity: Option<PeerIdentity>,
}

/// Registry of live realtime connections.
pub struct Presence {
    slots: RwLock<HashMap<ConnId, Slot>>,
}

impl Presence {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly accepted connection.  The returned id stays valid
    /// until [`Presence::remove`].
    pub async fn register(&self, tx: mpsc::UnboundedSender<String>) -> ConnId {
        let id = Uuid::new_v4();
        self.slots
            .write()
            .await
            .insert(id, Slot { tx, identity: None });
        id
    }

    /// Attach an identity to a connection.  Returns false if the connection
    /// is already gone.
    pub async fn identify(&self, id: ConnId, identity: PeerIdentity) -> bool {
        match self.slots.write().await.get_mut(&id) {
            Some(slot) => {
                slot.identity = Some(identity);
                true
            }
            None => false,
        }
    }

    pub async fn identity(&self, id: ConnId) -> Option<PeerIdentity> {
        self.slots
            .read()
            .await
            .get(&id)
            .and_then(|slot| slot.identity.clone())
    }

    /// Drop a connection.  Returns whether it had joined (and the roster
    /// therefore changed).
    pub async fn remove(&self, id: ConnId) -> bool {
        self.slots
            .write()
            .await
            .remove(&id)
            .map(|slot| slot.identity.is_some())
            .unwrap_or(false)
    }

    /// The current online roster: one entry per identified connection.
    pub async fn roster(&self) -> Vec<PeerPresence> {
        self.slots
            .read()
            .await
            .values()
            .filter_map(|slot| slot.identity.as_ref())
            .map(|identity| PeerPresence {
                username: identity.username.clone(),
                ip: identity.ip.clone(),
            })
            .collect()
    }

    /// Send an event to every live connection (joined or not).  Send
    /// failures mean the peer is tearing down; its slot is reaped by its
    /// own connection task.
    pub async fn broadcast(&self, event: &ServerEvent) {
        self.broadcast_inner(event, None).await;
    }

    /// Broadcast to everyone except one connection (e.g. the joiner).
    pub async fn broadcast_except(&self, except: ConnId, event: &ServerEvent) {
        self.broadcast_inner(event, Some(except)).await;
    }

    async fn broadcast_inner(&self, event: &ServerEvent, except: Option<ConnId>) {
        let frame = match event.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast event");
                return;
            }
        };

        for (id, slot) in self.slots.read().await.iter() {
            if Some(*id) == except {
                continue;
            }
            let _ = slot.tx.send(frame.clone());
        }
    }

    /// Send an event to a single connection.  Returns false if it is gone.
    pub async fn send_to(&self, id: ConnId, event: &ServerEvent) -> bool {
        let frame = match event.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event");
                return false;
            }
        };

        match self.slots.read().await.get(&id) {
            Some(slot) => slot.tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Live connections, joined or not.
    #[allow(dead_code)]
    pub async fn connection_count(&self) -> usize {
        self.slots.read().await.len()
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}
