//! Server state

use std::sync::Arc;

use crate::channel::LogChannel;
use crate::deployment::store::DeploymentStore;

/// Server state shared across handlers
pub struct ServerState {
    pub channel: Arc<LogChannel>,
    pub store: Arc<DeploymentStore>,
}

impl ServerState {
    pub fn new(channel: Arc<LogChannel>, store: Arc<DeploymentStore>) -> Self {
        Self { channel, store }
    }
}
