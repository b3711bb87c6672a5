//! Client configuration.
//! Reads client.json from ~/.config/realboard/client.json (or platform
//! equivalent); missing or malformed files degrade to defaults.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use realboard_core::types::UserIdentity;
use serde::{Deserialize, Serialize};

use crate::transport::ReconnectPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the board REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// URL of the realtime push endpoint.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    #[serde(default)]
    pub user: Option<UserIdentity>,
    /// How long a just-moved card is shielded from reconciliation events
    /// that still reference its old lane.
    #[serde(default = "default_move_grace_ms")]
    pub move_grace_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_realtime_url() -> String {
    "ws://localhost:8080/realtime".to_string()
}

fn default_move_grace_ms() -> u64 {
    3000
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_secs() -> u64 {
    2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            realtime_url: default_realtime_url(),
            user: None,
            move_grace_ms: default_move_grace_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
        }
    }
}

impl ClientConfig {
    pub fn move_grace(&self) -> Duration {
        Duration::from_millis(self.move_grace_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            backoff: Duration::from_secs(self.reconnect_backoff_secs),
        }
    }
}

/// Default config path: ~/.config/realboard/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("realboard")
        .join("client.json")
}

/// Load config from path. Returns defaults if the file doesn't exist.
pub fn load_config(path: &PathBuf) -> ClientConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            ClientConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            ClientConfig::default()
        }
    }
}
