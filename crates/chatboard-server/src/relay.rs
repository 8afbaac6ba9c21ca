//! Outbound activity relay.
//!
//! Forwards join/message activity to an external notification channel as a
//! JSON webhook POST.  Strictly fire-and-forget: no return value, no retry,
//! outcome logged only.  The far side of the webhook is outside this
//! server.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Kind of activity forwarded to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// A message was posted.
    Message,
    /// A user joined or registered.
    User,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Message => "message",
            ActivityKind::User => "user",
        }
    }
}

struct RelayTarget {
    url: String,
    token: Option<String>,
}

pub struct ActivityRelay {
    client: reqwest::Client,
    target: Option<RelayTarget>,
}

impl ActivityRelay {
    pub fn from_config(config: &ServerConfig) -> Self {
        let target = config.relay_webhook_url.clone().map(|url| RelayTarget {
            url,
            token: config.relay_token.clone(),
        });

        if let Some(ref t) = target {
            tracing::info!(url = %t.url, "activity relay configured");
        }

        Self {
            client: reqwest::Client::new(),
            target,
        }
    }

    /// Relay with no configured target; every call is a no-op.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            target: None,
        }
    }

    /// Forward one activity.  Spawns the POST and returns immediately.
    pub fn notify_activity(&self, kind: ActivityKind, username: &str, ip: &str) {
        let Some(ref target) = self.target else {
            debug!(kind = kind.as_str(), "activity relay disabled, dropping");
            return;
        };

        let body = serde_json::json!({
            "kind": kind.as_str(),
            "username": username,
            "ip": ip,
            "at": Utc::now(),
        });

        let client = self.client.clone();
        let url = target.url.clone();
        let token = target.token.clone();

        tokio::spawn(async move {
            let mut req = client.post(&url).json(&body);
            if let Some(t) = token {
                req = req.header("Authorization", format!("Bearer {t}"));
            }
            match req.send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        warn!(status = %resp.status(), "activity relay returned error");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "activity relay call failed");
                }
            }
        });
    }
}
