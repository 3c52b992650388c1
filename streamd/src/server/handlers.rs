//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::channel::connection::handle_socket;
use crate::channel::ChannelStats;
use crate::errors::StreamError;
use crate::models::deployment::{Deployment, StatusUpdate};
use crate::server::state::ServerState;
use crate::telemetry::{collect_metrics, SystemMetrics};
use crate::utils::{generate_uuid, version_info};

fn status_for(error: &StreamError) -> StatusCode {
    match error {
        StreamError::NotFound(_) => StatusCode::NOT_FOUND,
        StreamError::InvalidTransition(_) | StreamError::Terminal(_) => StatusCode::CONFLICT,
        StreamError::ProtocolError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Generic error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(error: StreamError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gitship-streamd".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub system: SystemMetrics,
    pub channel: ChannelStats,
}

/// Metrics handler
pub async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(MetricsResponse {
        system: collect_metrics(),
        channel: state.channel.stats().await,
    })
}

/// WebSocket upgrade handler for the streaming channel
pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let channel = state.channel.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, channel))
}

/// Enqueue request
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub commit_hash: String,
    pub commit_message: String,
    pub branch: String,
}

/// Create deployment handler
pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let deployment = state
        .store
        .create(
            generate_uuid(),
            req.commit_hash,
            req.commit_message,
            req.branch,
        )
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(deployment)))
}

/// Deployment list response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<Deployment>,
    pub total: usize,
}

/// List deployments handler
pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let deployments = state.store.list().await;
    let total = deployments.len();
    Json(DeploymentsResponse { deployments, total })
}

/// Fetch one deployment
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get(&id).await {
        Some(deployment) => Ok(Json(deployment)),
        None => Err(error_response(StreamError::NotFound(format!(
            "deployment {}",
            id
        )))),
    }
}

/// Executor status update handler
pub async fn update_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if let Some(reason) = update.error_message.as_deref() {
        error!("Deployment {} reported failure: {}", id, reason);
    }

    let deployment = state
        .store
        .update_status(&id, update)
        .await
        .map_err(error_response)?;

    Ok(Json(deployment))
}

/// Log line ingest request
#[derive(Debug, Deserialize)]
pub struct IngestLogRequest {
    pub message: String,
}

/// Log line ingest response
#[derive(Debug, Serialize)]
pub struct IngestLogResponse {
    /// Connections the line was pushed to
    pub delivered: usize,
}

/// Executor log ingest handler: retain the line and fan it out live, in one
/// step so concurrent ingests cannot reorder the stream against the record
pub async fn ingest_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<IngestLogRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let (_line, delivered) = state
        .store
        .append_and_publish(&id, req.message, &state.channel)
        .await
        .map_err(error_response)?;

    Ok(Json(IngestLogResponse { delivered }))
}

/// Full-log download handler
pub async fn download_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let log = state.store.full_log(&id).await.map_err(error_response)?;

    let mut body = String::new();
    for line in &log {
        body.push_str(&line.message);
        body.push('\n');
    }

    Ok(([("content-type", "text/plain; charset=utf-8")], body))
}
