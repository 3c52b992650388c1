//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::StreamError;
use crate::server::handlers::{
    create_deployment_handler, download_log_handler, get_deployment_handler, health_handler,
    ingest_log_handler, list_deployments_handler, metrics_handler, update_status_handler,
    version_handler, ws_handler,
};
use crate::server::state::ServerState;

/// Build the service router
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Live log stream
        .route("/ws", get(ws_handler))
        // Deployments
        .route(
            "/deployments",
            get(list_deployments_handler).post(create_deployment_handler),
        )
        .route("/deployments/{id}", get(get_deployment_handler))
        .route("/deployments/{id}/status", post(update_status_handler))
        .route(
            "/deployments/{id}/log",
            get(download_log_handler).post(ingest_log_handler),
        )
        // Telemetry
        .route("/telemetry/metrics", get(metrics_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), StreamError>>, StreamError> {
    let app = build_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| StreamError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| StreamError::ServerError(e.to_string()))
    });

    Ok(handle)
}
