//! Log streaming channel
//!
//! Per-deployment pub/sub fan-out: build executors publish log lines, and
//! any number of observer connections subscribed to that deployment receive
//! them in production order. Lines from different deployments may interleave
//! arbitrarily; within one deployment the order is total.

pub mod connection;
pub mod queue;
pub mod registry;
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::channel::registry::{ConnectionHandle, ConnectionId, Registry};
use crate::errors::StreamError;

/// Channel options
#[derive(Debug, Clone)]
pub struct Options {
    /// Per-connection outbound buffer capacity in messages
    pub outbound_buffer_lines: usize,

    /// Number of routing table shards
    pub shards: usize,

    /// WebSocket heartbeat interval
    pub heartbeat_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            outbound_buffer_lines: 1024,
            shards: 16,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Channel counters for the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Currently open connections
    pub connections: usize,

    /// Active subscriptions across all connections
    pub subscriptions: usize,

    /// Log lines accepted for fan-out since startup
    pub lines_published: u64,

    /// Buffered lines dropped to slow consumers since startup
    pub lines_dropped: u64,
}

/// The log streaming channel
pub struct LogChannel {
    registry: Registry,
    options: Options,
    lines_published: AtomicU64,
    lines_dropped: AtomicU64,
}

impl LogChannel {
    pub fn new(options: Options) -> Self {
        Self {
            registry: Registry::new(options.shards, options.outbound_buffer_lines),
            options,
            lines_published: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register a new observer connection
    pub async fn open_connection(&self) -> ConnectionHandle {
        let handle = self.registry.open().await;
        debug!("Opened connection {}", handle.id);
        handle
    }

    /// Subscribe a connection to one deployment's log stream. Idempotent.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        deployment_id: &str,
    ) -> Result<(), StreamError> {
        self.registry.subscribe(connection_id, deployment_id).await?;
        debug!(
            "Connection {} subscribed to deployment {}",
            connection_id, deployment_id
        );
        Ok(())
    }

    /// Unsubscribe a connection from one deployment. No-op if not subscribed.
    pub async fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        deployment_id: &str,
    ) -> Result<(), StreamError> {
        self.registry
            .unsubscribe(connection_id, deployment_id)
            .await?;
        debug!(
            "Connection {} unsubscribed from deployment {}",
            connection_id, deployment_id
        );
        Ok(())
    }

    /// Fan one log line out to every subscribed connection.
    ///
    /// Never blocks on a slow consumer; returns how many connections the
    /// line was handed to.
    pub async fn publish(&self, deployment_id: &str, line: &str) -> usize {
        let delivery = self.registry.publish(deployment_id, line).await;
        self.lines_published.fetch_add(1, Ordering::Relaxed);
        if delivery.dropped > 0 {
            self.lines_dropped
                .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
        }
        delivery.delivered
    }

    /// Tear down a connection and all its subscriptions. Idempotent.
    pub async fn close_connection(&self, connection_id: ConnectionId) {
        self.registry.close(connection_id).await;
        debug!("Closed connection {}", connection_id);
    }

    pub async fn stats(&self) -> ChannelStats {
        ChannelStats {
            connections: self.registry.connection_count().await,
            subscriptions: self.registry.subscription_count().await,
            lines_published: self.lines_published.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
        }
    }
}
