use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use chatboard_store::{Database, MirrorJob};

use crate::config::ServerConfig;
use crate::media::TempStore;
use crate::presence::Presence;
use crate::relay::ActivityRelay;

/// Shared handle threaded through every HTTP handler and connection task.
///
/// The primary database sits behind a `tokio::sync::Mutex` so store calls
/// serialize; they are the only suspension points in the pipeline.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    /// Queue into the mirror writer task.  Enqueue-and-forget: delivery is
    /// best-effort by design.
    pub mirror: mpsc::UnboundedSender<MirrorJob>,
    pub presence: Arc<Presence>,
    pub temp_store: Arc<TempStore>,
    pub relay: Arc<ActivityRelay>,
    pub config: Arc<ServerConfig>,
}
