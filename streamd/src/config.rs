//! Settings file management

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::StreamError;
use crate::logs::LogLevel;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Streaming channel configuration
    #[serde(default)]
    pub channel: ChannelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            server: ServerSettings::default(),
            channel: ChannelSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Streaming channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Per-connection outbound buffer capacity in log lines
    #[serde(default = "default_buffer_lines")]
    pub outbound_buffer_lines: usize,

    /// Number of routing table shards
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// WebSocket heartbeat interval in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_buffer_lines() -> usize {
    1024
}

fn default_shards() -> usize {
    16
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            outbound_buffer_lines: default_buffer_lines(),
            shards: default_shards(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

/// Load settings from a JSON file
pub async fn load_settings(path: impl AsRef<Path>) -> Result<Settings, StreamError> {
    let contents = fs::read_to_string(path.as_ref()).await?;
    let settings = serde_json::from_str(&contents)?;
    Ok(settings)
}
