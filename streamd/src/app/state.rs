//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::channel::LogChannel;
use crate::deployment::store::DeploymentStore;

/// Main application state
pub struct AppState {
    /// Log streaming channel
    pub channel: Arc<LogChannel>,

    /// Deployment record store
    pub store: Arc<DeploymentStore>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions) -> Self {
        info!(
            "Initializing application state (buffer={} lines, {} shards)...",
            options.channel.outbound_buffer_lines, options.channel.shards
        );

        Self {
            channel: Arc::new(LogChannel::new(options.channel.clone())),
            store: Arc::new(DeploymentStore::new()),
        }
    }
}
