//! # chatboard-server
//!
//! Realtime group chat board server.
//!
//! This binary provides:
//! - **WebSocket gateway** that ingests text/image/video/voice messages,
//!   soft-deletes on request, and fans events out to every connection
//! - **Dual-store persistence**: an authoritative SQLite primary and a
//!   best-effort document mirror written by a background task
//! - **Presence registry** broadcasting the online roster on every change
//! - **REST API** (axum) for history reads, multipart uploads, profiles,
//!   and in-app notifications
//! - **Hourly sweep** reclaiming uploads past their 7-day TTL
//! - **Activity relay** forwarding join/message events to an external
//!   webhook, fire-and-forget

mod api;
mod config;
mod error;
mod gateway;
mod media;
mod notify;
mod pipeline;
mod presence;
mod relay;
mod state;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatboard_store::{spawn_mirror_writer, Database, MirrorStore};

use crate::config::ServerConfig;
use crate::media::TempStore;
use crate::presence::Presence;
use crate::relay::ActivityRelay;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatboard_server=debug")),
        )
        .init();

    info!("Starting chatboard server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Primary store (runs migrations on open).
    let db = Database::open_at(&config.db_path)?;

    // Secondary mirror plus its fire-and-forget writer task.
    let mirror_store = MirrorStore::open(config.mirror_path.clone()).await?;
    let mirror = spawn_mirror_writer(mirror_store);

    // Ephemeral upload storage (creates directory if missing).
    let temp_store = Arc::new(TempStore::new(config.temp_dir.clone()).await?);

    // Presence registry: empty at every process start by design.
    let presence = Arc::new(Presence::new());

    // External notification relay (no-op unless configured).
    let relay = Arc::new(ActivityRelay::from_config(&config));

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        mirror,
        presence,
        temp_store,
        relay,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn the expired-upload sweep
    // -----------------------------------------------------------------------
    let sweep = media::spawn_sweep(state.clone());

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + realtime server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                sweep.abort();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    sweep.abort();
    Ok(())
}
