//! Loading of the server settings from `ServerConfig.json`.

use crate::game_match::MatchTimings;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::fs;

/// The environment variable that may point to another config file.
pub const CONFIG_PATH_VARIABLE: &str = "MATCH_SERVER_CONFIG";
/// The config file used if the variable is not set.
pub const DEFAULT_CONFIG_PATH: &str = "ServerConfig.json";

/// The settings of the server. Every field may be left out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to listen on.
    pub address: String,
    /// The port to listen on.
    pub port: u16,
    /// Directory of the static client files.
    pub static_dir: String,
    /// Delay between the start of a match and the first rows.
    pub start_delay_ms: u64,
    /// Period of the obstacle delivery.
    pub delivery_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".into(),
            port: 8080,
            static_dir: ".".into(),
            start_delay_ms: 5000,
            delivery_interval_ms: 3000,
        }
    }
}

impl ServerConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn timings(&self) -> MatchTimings {
        MatchTimings {
            start_delay: Duration::from_millis(self.start_delay_ms),
            delivery_interval: Duration::from_millis(self.delivery_interval_ms),
        }
    }
}

/// Reads the config file. A missing file means defaults, a broken one is an error.
pub async fn load_config(path: &str) -> Result<ServerConfig, String> {
    let json_content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path, "No config file found, using defaults.");
            return Ok(ServerConfig::default());
        }
        Err(e) => return Err(format!("Failed to read file: {}", e)),
    };
    serde_json::from_str(&json_content).map_err(|e| format!("Failed to parse JSON: {}", e))
}
