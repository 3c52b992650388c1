//! End-to-end server tests
//!
//! Spins the real router up on an ephemeral port, drives the executor-facing
//! HTTP surface with an HTTP client and the observer side with a real
//! WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use streamd::channel::{LogChannel, Options};
use streamd::deployment::store::DeploymentStore;
use streamd::server::serve::build_router;
use streamd::server::state::ServerState;

async fn spawn_server() -> SocketAddr {
    spawn_server_with(Options {
        outbound_buffer_lines: 256,
        shards: 4,
        heartbeat_interval: Duration::from_secs(30),
    })
    .await
}

async fn spawn_server_with(options: Options) -> SocketAddr {
    let channel = Arc::new(LogChannel::new(options));
    let store = Arc::new(DeploymentStore::new());
    let app = build_router(Arc::new(ServerState::new(channel, store)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn create_deployment(client: &reqwest::Client, addr: SocketAddr) -> Value {
    client
        .post(format!("http://{}/deployments", addr))
        .json(&json!({
            "commit_hash": "abc1234",
            "commit_message": "fix login redirect",
            "branch": "main",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn next_json(
    ws: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while let Some(msg) = ws.next().await {
            if let Message::Text(text) = msg.unwrap() {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
        panic!("WebSocket closed before a text message arrived");
    })
    .await
    .expect("timed out waiting for a WebSocket message")
}

#[tokio::test]
async fn test_health_and_version() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "gitship-streamd");

    let version: Value = client
        .get(format!("http://{}/version", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(version["version"].is_string());
}

#[tokio::test]
async fn test_live_stream_end_to_end() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let deployment = create_deployment(&client, addr).await;
    let id = deployment["id"].as_str().unwrap().to_string();
    assert_eq!(deployment["status"], "queued");

    // Observer subscribes before any output exists
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws.send(Message::Text(
        json!({"type": "subscribe", "deploymentId": id}).to_string().into(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Executor starts the build and emits two lines
    let response = client
        .post(format!("http://{}/deployments/{}/status", addr, id))
        .json(&json!({"status": "building"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    for line in ["Installing dependencies", "Build succeeded"] {
        let response = client
            .post(format!("http://{}/deployments/{}/log", addr, id))
            .json(&json!({"message": line}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["delivered"], 1);
    }

    // Observer receives exactly those two lines, in order, tagged with the id
    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "log");
    assert_eq!(first["deploymentId"], id.as_str());
    assert_eq!(first["message"], "Installing dependencies");

    let second = next_json(&mut ws).await;
    assert_eq!(second["message"], "Build succeeded");

    // Executor finishes; record becomes terminal with a deployed URL
    let response = client
        .post(format!("http://{}/deployments/{}/status", addr, id))
        .json(&json!({"status": "success", "url": "https://app.gitship.dev"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let record: Value = client
        .get(format!("http://{}/deployments/{}", addr, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["status"], "success");
    assert_eq!(record["url"], "https://app.gitship.dev");

    // Full log is retained for download
    let log = client
        .get(format!("http://{}/deployments/{}/log", addr, id))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(log, "Installing dependencies\nBuild succeeded\n");

    // Terminal deployments accept no further lines
    let response = client
        .post(format!("http://{}/deployments/{}/log", addr, id))
        .json(&json!({"message": "late line"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_status_transition_rejected() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let deployment = create_deployment(&client, addr).await;
    let id = deployment["id"].as_str().unwrap();

    let response = client
        .post(format!("http://{}/deployments/{}/status", addr, id))
        .json(&json!({"status": "success"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protocol_error_keeps_connection_open() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let deployment = create_deployment(&client, addr).await;
    let id = deployment["id"].as_str().unwrap().to_string();

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    // Malformed payload gets an error reply, not a connection close
    ws.send(Message::Text("not json at all".to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // The same connection still works
    ws.send(Message::Text(
        json!({"type": "subscribe", "deploymentId": id}).to_string().into(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .post(format!("http://{}/deployments/{}/status", addr, id))
        .json(&json!({"status": "building"}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("http://{}/deployments/{}/log", addr, id))
        .json(&json!({"message": "still streaming"}))
        .send()
        .await
        .unwrap();

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "log");
    assert_eq!(msg["message"], "still streaming");
}

#[tokio::test]
async fn test_heartbeat_ping_reaches_idle_connection() {
    let addr = spawn_server_with(Options {
        outbound_buffer_lines: 256,
        shards: 4,
        heartbeat_interval: Duration::from_millis(50),
    })
    .await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    // An idle connection gets transport pings on the configured interval
    let pinged = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(msg) = ws.next().await {
            if matches!(msg.unwrap(), Message::Ping(_)) {
                return true;
            }
        }
        false
    })
    .await
    .expect("timed out waiting for a heartbeat ping");
    assert!(pinged);

    // The connection is still live after the heartbeat fired
    ws.send(Message::Text(json!({"type": "ping"}).to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn test_unsubscribe_message_stops_delivery() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let deployment = create_deployment(&client, addr).await;
    let id = deployment["id"].as_str().unwrap().to_string();

    client
        .post(format!("http://{}/deployments/{}/status", addr, id))
        .json(&json!({"status": "building"}))
        .send()
        .await
        .unwrap();

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws.send(Message::Text(
        json!({"type": "subscribe", "deploymentId": id}).to_string().into(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .post(format!("http://{}/deployments/{}/log", addr, id))
        .json(&json!({"message": "first"}))
        .send()
        .await
        .unwrap();
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["message"], "first");

    ws.send(Message::Text(
        json!({"type": "unsubscribe", "deploymentId": id}).to_string().into(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = client
        .post(format!("http://{}/deployments/{}/log", addr, id))
        .json(&json!({"message": "second"}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["delivered"], 0);

    // Application-level ping still answered; no log line ever arrives
    ws.send(Message::Text(json!({"type": "ping"}).to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn test_metrics_reports_channel_counters() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let metrics: Value = client
        .get(format!("http://{}/telemetry/metrics", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(metrics["channel"]["connections"], 0);
    assert_eq!(metrics["channel"]["lines_published"], 0);
    assert!(metrics["system"]["memory_total"].as_u64().unwrap() > 0);
}
