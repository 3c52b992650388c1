//! Subscription routing table
//!
//! Maps deployment ids to the outbound queues of subscribed connections, and
//! connections to their subscription sets so teardown releases everything in
//! one step. The deployment side is sharded by id hash; fan-out and mutation
//! for one deployment are mutually exclusive per shard, which is what keeps
//! per-deployment delivery order identical across subscribers.
//!
//! Lock order: connection map before shard, never the reverse.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channel::queue::{OutboundQueue, PushOutcome};
use crate::channel::wire::ServerMessage;
use crate::errors::StreamError;

/// Identifier of one observer connection
pub type ConnectionId = u64;

/// Handle to a registered connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub queue: Arc<OutboundQueue>,
}

struct ConnectionEntry {
    queue: Arc<OutboundQueue>,
    subscriptions: HashSet<String>,
}

type Shard = HashMap<String, HashMap<ConnectionId, Arc<OutboundQueue>>>;

/// Delivery accounting for one `publish` call
#[derive(Debug, Clone, Copy, Default)]
pub struct Delivery {
    /// Connections the line was handed to
    pub delivered: usize,

    /// Connections that overflowed and dropped their oldest buffered line
    pub dropped: usize,
}

/// The routing table
pub struct Registry {
    shards: Vec<Mutex<Shard>>,
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Registry {
    pub fn new(shards: usize, queue_capacity: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    fn shard_for(&self, deployment_id: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        deployment_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Register a new connection and its outbound queue
    pub async fn open(&self) -> ConnectionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(OutboundQueue::new(self.queue_capacity));

        let mut connections = self.connections.lock().await;
        connections.insert(
            id,
            ConnectionEntry {
                queue: queue.clone(),
                subscriptions: HashSet::new(),
            },
        );

        ConnectionHandle { id, queue }
    }

    /// Register interest in one deployment's log stream. Idempotent.
    ///
    /// The deployment does not have to be known yet; the subscription simply
    /// delivers nothing until matching lines arrive.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        deployment_id: &str,
    ) -> Result<(), StreamError> {
        let mut connections = self.connections.lock().await;
        let entry = connections.get_mut(&connection_id).ok_or_else(|| {
            StreamError::ConnectionError(format!("unknown connection {}", connection_id))
        })?;

        entry.subscriptions.insert(deployment_id.to_string());
        let queue = entry.queue.clone();

        let mut shard = self.shard_for(deployment_id).lock().await;
        shard
            .entry(deployment_id.to_string())
            .or_default()
            .insert(connection_id, queue);

        Ok(())
    }

    /// Drop interest in one deployment's log stream. No-op if not subscribed.
    pub async fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        deployment_id: &str,
    ) -> Result<(), StreamError> {
        let mut connections = self.connections.lock().await;
        let entry = connections.get_mut(&connection_id).ok_or_else(|| {
            StreamError::ConnectionError(format!("unknown connection {}", connection_id))
        })?;
        entry.subscriptions.remove(deployment_id);

        let mut shard = self.shard_for(deployment_id).lock().await;
        if let Some(subscribers) = shard.get_mut(deployment_id) {
            subscribers.remove(&connection_id);
            if subscribers.is_empty() {
                shard.remove(deployment_id);
            }
        }

        Ok(())
    }

    /// Fan one log line out to every connection subscribed to `deployment_id`.
    ///
    /// Holds the shard lock for the whole fan-out so concurrent publishes to
    /// the same deployment cannot interleave differently per subscriber.
    /// Pushes never block; a full subscriber drops its oldest buffered line.
    pub async fn publish(&self, deployment_id: &str, message: &str) -> Delivery {
        let shard = self.shard_for(deployment_id).lock().await;
        let mut delivery = Delivery::default();

        if let Some(subscribers) = shard.get(deployment_id) {
            for queue in subscribers.values() {
                let msg = ServerMessage::Log {
                    deployment_id: deployment_id.to_string(),
                    message: message.to_string(),
                };
                match queue.push(msg) {
                    PushOutcome::Queued => delivery.delivered += 1,
                    PushOutcome::QueuedDroppedOldest => {
                        delivery.delivered += 1;
                        delivery.dropped += 1;
                    }
                    PushOutcome::Closed => {}
                }
            }
        }

        delivery
    }

    /// Remove a connection and every subscription it owns. Idempotent.
    pub async fn close(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.lock().await;
        let Some(entry) = connections.remove(&connection_id) else {
            return;
        };

        entry.queue.close();

        for deployment_id in &entry.subscriptions {
            let mut shard = self.shard_for(deployment_id).lock().await;
            if let Some(subscribers) = shard.get_mut(deployment_id) {
                subscribers.remove(&connection_id);
                if subscribers.is_empty() {
                    shard.remove(deployment_id);
                }
            }
        }
    }

    /// Number of open connections
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Number of active subscriptions across all connections
    pub async fn subscription_count(&self) -> usize {
        let connections = self.connections.lock().await;
        connections.values().map(|e| e.subscriptions.len()).sum()
    }
}
