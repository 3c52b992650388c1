//! Error types for the streaming service

use thiserror::Error;

/// Main error type for the streaming service
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deployment is terminal: {0}")]
    Terminal(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for StreamError {
    fn from(err: anyhow::Error) -> Self {
        StreamError::Internal(err.to_string())
    }
}
