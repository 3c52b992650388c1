//! Deployment status machine
//!
//! A deployment moves through `queued -> building -> success | failed`, and
//! may be cancelled from `queued` or `building`. All of `success`, `failed`
//! and `cancelled` are terminal.

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Enqueued, waiting for a build worker
    Queued,

    /// Build in progress
    Building,

    /// Build and deploy completed
    Success,

    /// Build failed
    Failed,

    /// Cancelled before completion
    Cancelled,
}

impl DeploymentStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is allowed
    pub fn can_transition(&self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (DeploymentStatus::Queued, DeploymentStatus::Building)
                | (DeploymentStatus::Building, DeploymentStatus::Success)
                | (DeploymentStatus::Building, DeploymentStatus::Failed)
                | (DeploymentStatus::Queued, DeploymentStatus::Cancelled)
                | (DeploymentStatus::Building, DeploymentStatus::Cancelled)
        )
    }

    /// Validate and apply a transition, returning the new status
    pub fn advance(&self, next: DeploymentStatus) -> Result<DeploymentStatus, String> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(format!("invalid transition: {:?} -> {:?}", self, next))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
