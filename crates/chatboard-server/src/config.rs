//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use chatboard_shared::constants::DEFAULT_HTTP_PORT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + realtime server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5555`
    pub http_addr: SocketAddr,

    /// Filesystem path of the primary SQLite database.
    /// Env: `DB_PATH`
    /// Default: `./chatboard.db`
    pub db_path: PathBuf,

    /// Root directory of the secondary document mirror.
    /// Env: `MIRROR_PATH`
    /// Default: `./mirror`
    pub mirror_path: PathBuf,

    /// Directory where ephemeral uploads are stored until swept.
    /// Env: `TEMP_DIR`
    /// Default: `./temp`
    pub temp_dir: PathBuf,

    /// File holding the shared board background image data.
    /// Env: `BACKGROUND_PATH`
    /// Default: `./background.dat`
    pub background_path: PathBuf,

    /// Webhook URL of the external activity relay.
    /// Env: `RELAY_WEBHOOK_URL`
    /// Default: unset (relay disabled).
    pub relay_webhook_url: Option<String>,

    /// Optional bearer token sent with relay calls.
    /// Env: `RELAY_TOKEN`
    pub relay_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            db_path: PathBuf::from("./chatboard.db"),
            mirror_path: PathBuf::from("./mirror"),
            temp_dir: PathBuf::from("./temp"),
            background_path: PathBuf::from("./background.dat"),
            relay_webhook_url: None,
            relay_token: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("MIRROR_PATH") {
            config.mirror_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("TEMP_DIR") {
            config.temp_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("BACKGROUND_PATH") {
            config.background_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("RELAY_WEBHOOK_URL") {
            if !url.is_empty() {
                config.relay_webhook_url = Some(url);
            }
        }

        if let Ok(token) = std::env::var("RELAY_TOKEN") {
            if !token.is_empty() {
                config.relay_token = Some(token);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
