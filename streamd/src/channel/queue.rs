//! Bounded per-connection outbound queue
//!
//! `publish` must never block the producer on a slow consumer, so each
//! connection buffers at most `capacity` messages. On overflow the oldest
//! buffered message is dropped and a single truncation marker is emitted at
//! the gap, ahead of the retained newest messages.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::channel::wire::ServerMessage;

struct Inner {
    buf: VecDeque<ServerMessage>,
    truncated: bool,
    closed: bool,
    dropped_total: u64,
}

/// Outcome of a push, used for overflow accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message buffered
    Queued,

    /// Message buffered, oldest buffered message dropped
    QueuedDroppedOldest,

    /// Queue already closed, message discarded
    Closed,
}

/// Bounded outbound message queue for one connection
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity.min(64)),
                truncated: false,
                closed: false,
                dropped_total: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning cannot leave the queue in an inconsistent state; recover
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message, dropping the oldest buffered one on overflow.
    ///
    /// Never blocks.
    pub fn push(&self, msg: ServerMessage) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }
            let outcome = if inner.buf.len() >= self.capacity {
                inner.buf.pop_front();
                inner.truncated = true;
                inner.dropped_total += 1;
                PushOutcome::QueuedDroppedOldest
            } else {
                PushOutcome::Queued
            };
            inner.buf.push_back(msg);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Take the next message without waiting.
    ///
    /// When an overflow occurred since the last take, a `Truncated` marker is
    /// returned first, before the retained messages.
    pub fn try_recv(&self) -> Option<ServerMessage> {
        let mut inner = self.lock();
        if inner.truncated {
            inner.truncated = false;
            return Some(ServerMessage::Truncated);
        }
        inner.buf.pop_front()
    }

    /// Await the next message; `None` once closed and drained
    pub async fn recv(&self) -> Option<ServerMessage> {
        loop {
            {
                let mut inner = self.lock();
                if inner.truncated {
                    inner.truncated = false;
                    return Some(ServerMessage::Truncated);
                }
                if let Some(msg) = inner.buf.pop_front() {
                    return Some(msg);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; pending messages may still be drained
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total messages dropped to overflow since the queue was created
    pub fn dropped_total(&self) -> u64 {
        self.lock().dropped_total
    }
}
