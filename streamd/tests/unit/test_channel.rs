//! Log streaming channel tests
//!
//! Exercises the in-process channel API directly: per-deployment ordering,
//! fan-out isolation, idempotent subscriptions, teardown, and the bounded
//! outbound buffer overflow policy.

use std::sync::Arc;
use std::time::Duration;

use streamd::channel::registry::ConnectionHandle;
use streamd::channel::wire::ServerMessage;
use streamd::channel::{LogChannel, Options};
use streamd::deployment::status::DeploymentStatus;
use streamd::deployment::store::DeploymentStore;
use streamd::models::deployment::StatusUpdate;

fn channel_with_buffer(capacity: usize) -> LogChannel {
    LogChannel::new(Options {
        outbound_buffer_lines: capacity,
        shards: 4,
        heartbeat_interval: Duration::from_secs(30),
    })
}

fn drain(handle: &ConnectionHandle) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Some(msg) = handle.queue.try_recv() {
        messages.push(msg);
    }
    messages
}

fn log(deployment_id: &str, message: &str) -> ServerMessage {
    ServerMessage::Log {
        deployment_id: deployment_id.to_string(),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_ordered_delivery_to_single_subscriber() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "42").await.unwrap();

    assert_eq!(channel.publish("42", "Installing dependencies").await, 1);
    assert_eq!(channel.publish("42", "Build succeeded").await, 1);

    assert_eq!(
        drain(&conn),
        vec![
            log("42", "Installing dependencies"),
            log("42", "Build succeeded"),
        ]
    );
}

#[tokio::test]
async fn test_fanout_identical_sequences() {
    let channel = channel_with_buffer(64);
    let a = channel.open_connection().await;
    let b = channel.open_connection().await;
    channel.subscribe(a.id, "42").await.unwrap();
    channel.subscribe(b.id, "42").await.unwrap();

    for n in 0..20 {
        assert_eq!(channel.publish("42", &format!("line {}", n)).await, 2);
    }

    let from_a = drain(&a);
    let from_b = drain(&b);
    assert_eq!(from_a.len(), 20);
    assert_eq!(from_a, from_b);
}

#[tokio::test]
async fn test_no_cross_deployment_leakage() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "42").await.unwrap();

    channel.publish("99", "other deployment line").await;
    channel.publish("42", "my line").await;

    assert_eq!(drain(&conn), vec![log("42", "my line")]);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "42").await.unwrap();

    channel.publish("42", "before").await;
    channel.unsubscribe(conn.id, "42").await.unwrap();
    channel.publish("42", "after").await;

    assert_eq!(drain(&conn), vec![log("42", "before")]);
}

#[tokio::test]
async fn test_unsubscribe_not_subscribed_is_noop() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.unsubscribe(conn.id, "42").await.unwrap();
}

#[tokio::test]
async fn test_close_releases_all_subscriptions() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "d1").await.unwrap();
    channel.subscribe(conn.id, "d2").await.unwrap();

    channel.close_connection(conn.id).await;

    assert_eq!(channel.publish("d1", "line").await, 0);
    assert_eq!(channel.publish("d2", "line").await, 0);

    let stats = channel.stats().await;
    assert_eq!(stats.connections, 0);
    assert_eq!(stats.subscriptions, 0);
}

#[tokio::test]
async fn test_duplicate_subscribe_delivers_once() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "42").await.unwrap();
    channel.subscribe(conn.id, "42").await.unwrap();

    assert_eq!(channel.publish("42", "only once").await, 1);
    assert_eq!(drain(&conn), vec![log("42", "only once")]);
}

#[tokio::test]
async fn test_subscribe_to_unknown_deployment_is_silent() {
    let channel = channel_with_buffer(64);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "never-built").await.unwrap();

    // Emptiness is a valid terminal observation
    assert!(drain(&conn).is_empty());
}

#[tokio::test]
async fn test_slow_consumer_overflow_policy() {
    let channel = channel_with_buffer(100);
    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "7").await.unwrap();

    // Producer completes all publishes without a consumer draining anything
    for n in 0..10_000 {
        channel.publish("7", &format!("line {}", n)).await;
    }

    let messages = drain(&conn);

    // One truncation marker at the gap, then the newest 100 lines
    assert_eq!(messages[0], ServerMessage::Truncated);
    let lines: Vec<&ServerMessage> = messages[1..].iter().collect();
    assert!(lines.len() <= 100);
    assert_eq!(*lines.last().unwrap(), &log("7", "line 9999"));
    let markers = messages
        .iter()
        .filter(|m| **m == ServerMessage::Truncated)
        .count();
    assert_eq!(markers, 1);

    let stats = channel.stats().await;
    assert_eq!(stats.lines_published, 10_000);
    assert_eq!(stats.lines_dropped, 9_900);
}

#[tokio::test]
async fn test_overflow_on_one_connection_does_not_affect_others() {
    let channel = channel_with_buffer(10);
    let slow = channel.open_connection().await;
    let fast = channel.open_connection().await;
    channel.subscribe(slow.id, "7").await.unwrap();
    channel.subscribe(fast.id, "7").await.unwrap();

    let mut received = Vec::new();
    for n in 0..50 {
        channel.publish("7", &format!("line {}", n)).await;
        // The fast consumer drains as lines arrive; the slow one never does
        while let Some(msg) = fast.queue.try_recv() {
            received.push(msg);
        }
    }

    assert_eq!(received.len(), 50);
    assert_eq!(received[0], log("7", "line 0"));
    assert_eq!(received[49], log("7", "line 49"));
}

#[tokio::test]
async fn test_concurrent_publishers_keep_per_deployment_order_consistent() {
    let channel = Arc::new(channel_with_buffer(4096));
    let a = channel.open_connection().await;
    let b = channel.open_connection().await;
    channel.subscribe(a.id, "42").await.unwrap();
    channel.subscribe(b.id, "42").await.unwrap();

    let mut tasks = Vec::new();
    for producer in 0..4 {
        let channel = channel.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..100 {
                channel
                    .publish("42", &format!("p{} line {}", producer, n))
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Interleaving across producers is arbitrary, but both subscribers must
    // observe the identical sequence
    let from_a = drain(&a);
    let from_b = drain(&b);
    assert_eq!(from_a.len(), 400);
    assert_eq!(from_a, from_b);
}

#[tokio::test]
async fn test_concurrent_ingest_keeps_live_and_retained_order_aligned() {
    let channel = Arc::new(channel_with_buffer(4096));
    let store = Arc::new(DeploymentStore::new());
    store
        .create(
            "42".to_string(),
            "abc1234".to_string(),
            "initial commit".to_string(),
            "main".to_string(),
        )
        .await
        .unwrap();
    store
        .update_status(
            "42",
            StatusUpdate {
                status: DeploymentStatus::Building,
                error_message: None,
                url: None,
            },
        )
        .await
        .unwrap();

    let conn = channel.open_connection().await;
    channel.subscribe(conn.id, "42").await.unwrap();

    let mut tasks = Vec::new();
    for producer in 0..4 {
        let store = store.clone();
        let channel = channel.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..100 {
                store
                    .append_and_publish("42", format!("p{} line {}", producer, n), &channel)
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // The order a downloader reads back must be the order the live
    // subscriber saw, whatever interleaving the producers raced into
    let retained: Vec<String> = store
        .full_log("42")
        .await
        .unwrap()
        .into_iter()
        .map(|line| line.message)
        .collect();
    let live: Vec<String> = drain(&conn)
        .into_iter()
        .map(|msg| match msg {
            ServerMessage::Log { message, .. } => message,
            other => panic!("unexpected message: {:?}", other),
        })
        .collect();

    assert_eq!(retained.len(), 400);
    assert_eq!(live, retained);
}
