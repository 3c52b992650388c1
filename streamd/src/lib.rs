//! GitShip Build-Log Streaming Service
//!
//! Server half of the live build-log path: build executors push log lines
//! and status updates over HTTP, dashboard clients subscribe per deployment
//! over a persistent WebSocket and receive lines in production order.

pub mod app;
pub mod channel;
pub mod config;
pub mod deployment;
pub mod errors;
pub mod logs;
pub mod models;
pub mod server;
pub mod telemetry;
pub mod utils;
