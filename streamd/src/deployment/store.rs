//! In-memory deployment record store
//!
//! Holds deployment metadata and the accumulated log for each deployment so
//! the full log can be downloaded after the live stream is over. Status
//! changes go through the status machine; a terminal record no longer
//! accepts status changes or new log lines.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::channel::LogChannel;
use crate::deployment::status::DeploymentStatus;
use crate::errors::StreamError;
use crate::models::deployment::{Deployment, LogLine, StatusUpdate};

struct Record {
    deployment: Deployment,
    log: Vec<LogLine>,
}

impl Record {
    fn push_line(&mut self, message: String) -> Result<LogLine, StreamError> {
        if self.deployment.status.is_terminal() {
            return Err(StreamError::Terminal(self.deployment.id.clone()));
        }
        let line = LogLine {
            message,
            at: Utc::now(),
        };
        self.log.push(line.clone());
        Ok(line)
    }
}

/// Deployment record store
pub struct DeploymentStore {
    records: RwLock<HashMap<String, Record>>,
}

impl DeploymentStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new deployment record in `queued` state
    pub async fn create(
        &self,
        id: String,
        commit_hash: String,
        commit_message: String,
        branch: String,
    ) -> Result<Deployment, StreamError> {
        let deployment = Deployment {
            id: id.clone(),
            commit_hash,
            commit_message,
            branch,
            status: DeploymentStatus::Queued,
            url: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(StreamError::ServerError(format!(
                "deployment already exists: {}",
                id
            )));
        }
        records.insert(
            id.clone(),
            Record {
                deployment: deployment.clone(),
                log: Vec::new(),
            },
        );

        info!("Enqueued deployment {}", id);
        Ok(deployment)
    }

    /// Apply a status update from the build executor
    pub async fn update_status(
        &self,
        id: &str,
        update: StatusUpdate,
    ) -> Result<Deployment, StreamError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StreamError::NotFound(format!("deployment {}", id)))?;

        let current = record.deployment.status;
        let next = current
            .advance(update.status)
            .map_err(StreamError::InvalidTransition)?;

        record.deployment.status = next;
        match next {
            DeploymentStatus::Building => {
                record.deployment.started_at = Some(Utc::now());
            }
            DeploymentStatus::Success => {
                record.deployment.finished_at = Some(Utc::now());
                record.deployment.url = update.url;
            }
            DeploymentStatus::Failed | DeploymentStatus::Cancelled => {
                record.deployment.finished_at = Some(Utc::now());
                record.deployment.error_message = update.error_message;
            }
            DeploymentStatus::Queued => {}
        }

        info!("Deployment {} moved {} -> {}", id, current, next);
        Ok(record.deployment.clone())
    }

    /// Append one log line to a deployment's retained log
    ///
    /// Rejected once the deployment is terminal; the streaming channel goes
    /// quiet for that id because nothing is accepted for publication.
    pub async fn append_log(&self, id: &str, message: String) -> Result<LogLine, StreamError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StreamError::NotFound(format!("deployment {}", id)))?;
        record.push_line(message)
    }

    /// Append one log line and fan it out live, in one step
    ///
    /// The record lock is held across the fan-out, so concurrent ingests for
    /// the same deployment cannot retain one order and deliver another: the
    /// sequence a downloader reads later is the sequence live subscribers saw.
    pub async fn append_and_publish(
        &self,
        id: &str,
        message: String,
        channel: &LogChannel,
    ) -> Result<(LogLine, usize), StreamError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StreamError::NotFound(format!("deployment {}", id)))?;

        let line = record.push_line(message)?;
        let delivered = channel.publish(id, &line.message).await;
        Ok((line, delivered))
    }

    /// Fetch one deployment
    pub async fn get(&self, id: &str) -> Option<Deployment> {
        let records = self.records.read().await;
        records.get(id).map(|r| r.deployment.clone())
    }

    /// List all deployments, newest first
    pub async fn list(&self) -> Vec<Deployment> {
        let records = self.records.read().await;
        let mut deployments: Vec<Deployment> =
            records.values().map(|r| r.deployment.clone()).collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        deployments
    }

    /// The full accumulated log for a deployment
    pub async fn full_log(&self, id: &str) -> Result<Vec<LogLine>, StreamError> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(|r| r.log.clone())
            .ok_or_else(|| StreamError::NotFound(format!("deployment {}", id)))
    }
}

impl Default for DeploymentStore {
    fn default() -> Self {
        Self::new()
    }
}
