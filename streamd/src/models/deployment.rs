//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deployment::status::DeploymentStatus;

/// One build/deploy attempt for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Source commit hash
    pub commit_hash: String,

    /// Commit message
    pub commit_message: String,

    /// Branch name
    pub branch: String,

    /// Current status
    pub status: DeploymentStatus,

    /// Deployed URL, populated only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Failure reason reported by the executor, populated on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// When the build was enqueued
    pub created_at: DateTime<Utc>,

    /// When the build started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the build reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Build duration, available once started and finished
    pub fn build_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        }
    }
}

/// Status update pushed by the build executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// New status
    pub status: DeploymentStatus,

    /// Optional error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Deployed URL, only meaningful on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One retained unit of build output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Log message text
    pub message: String,

    /// When the line was received
    pub at: DateTime<Utc>,
}
