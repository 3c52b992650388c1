//! WebSocket session driver
//!
//! One task pair per connection: a writer draining the outbound queue into
//! the socket (and sending heartbeat pings), and the read loop handling
//! subscribe/unsubscribe requests. Every exit path releases the connection's
//! subscriptions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::channel::queue::OutboundQueue;
use crate::channel::registry::ConnectionId;
use crate::channel::wire::{ClientMessage, ServerMessage};
use crate::channel::LogChannel;
use crate::errors::StreamError;

/// Drive one upgraded WebSocket until it closes
pub async fn handle_socket(socket: WebSocket, channel: Arc<LogChannel>) {
    let handle = channel.open_connection().await;
    let connection_id = handle.id;
    let heartbeat_interval = channel.options().heartbeat_interval;

    let (sender, mut receiver) = socket.split();

    let queue = handle.queue.clone();
    let writer = tokio::spawn(async move {
        write_loop(sender, queue, heartbeat_interval).await;
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_message(&channel, connection_id, &handle.queue, text.as_str()).await;
            }
            Ok(Message::Close(_)) => {
                debug!("Connection {} closed by peer", connection_id);
                break;
            }
            // Binary frames are not part of the protocol; control frames are
            // handled by the transport
            Ok(_) => {}
            Err(e) => {
                warn!("Connection {} transport error: {}", connection_id, e);
                break;
            }
        }
    }

    // Releases all subscriptions and closes the queue, which ends the writer
    channel.close_connection(connection_id).await;
    let _ = writer.await;
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    queue: Arc<OutboundQueue>,
    heartbeat_interval: std::time::Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.reset(); // skip the immediate first tick

    loop {
        tokio::select! {
            msg = queue.recv() => {
                let Some(msg) = msg else {
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn handle_client_message(
    channel: &LogChannel,
    connection_id: ConnectionId,
    queue: &OutboundQueue,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            // Protocol errors are reported per message; the connection stays open
            let error = StreamError::ProtocolError(e.to_string());
            debug!("Connection {} sent invalid payload: {}", connection_id, error);
            queue.push(ServerMessage::Error {
                message: error.to_string(),
            });
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { deployment_id } => {
            if let Err(e) = channel.subscribe(connection_id, &deployment_id).await {
                warn!("Subscribe failed on connection {}: {}", connection_id, e);
            }
        }
        ClientMessage::Unsubscribe { deployment_id } => {
            if let Err(e) = channel.unsubscribe(connection_id, &deployment_id).await {
                warn!("Unsubscribe failed on connection {}: {}", connection_id, e);
            }
        }
        ClientMessage::Ping => {
            queue.push(ServerMessage::Pong);
        }
    }
}
