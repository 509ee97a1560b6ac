// src/services/queue_service.rs

//! Per-queue control operations plus protection-aware bulk pause/resume.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::registry::QueueRegistry;
use crate::store::QueueBackend;
use crate::utils::pagination::Pagination;
use crate::utils::relative_time::format_epoch;

/// The attribute toggles exposed per queue, dispatched through one typed
/// table rather than one method per attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    SetLimit(i64),
    RemoveLimit,
    SetProcessLimit(i64),
    RemoveProcessLimit,
    Block,
    Unblock,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub name: String,
    pub size: u64,
    pub latency: f64,
    pub paused: bool,
    pub critical: bool,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedJobView {
    pub position: usize,
    pub jid: String,
    pub class: String,
    pub args: Value,
    pub queue: String,
    pub created_at: Option<String>,
    pub enqueued_at: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueJobsPage {
    pub queue_name: String,
    pub size: u64,
    pub latency: f64,
    pub jobs: Vec<QueuedJobView>,
    pub pagination: Pagination,
}

/// Outcome of a bulk pause/resume: critical queues are skipped, per-queue
/// failures are collected instead of aborting the sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct QueueService {
    backend: Arc<dyn QueueBackend>,
    registry: QueueRegistry,
    config: Arc<ManagerConfig>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl QueueService {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        registry: QueueRegistry,
        config: Arc<ManagerConfig>,
    ) -> Self {
        QueueService {
            backend,
            registry,
            config,
        }
    }

    fn log_op(&self, message: &str) {
        if self.config.enable_logging {
            info!("{message}");
        }
    }

    /// Every mutation validates the name against the registry before any
    /// backend call is issued.
    async fn validate(&self, name: &str) -> Result<(), ManagerError> {
        if self.registry.contains(name).await? {
            Ok(())
        } else {
            Err(ManagerError::InvalidQueue(name.to_string()))
        }
    }

    fn reject_critical(&self, name: &str, operation: &'static str) -> Result<(), ManagerError> {
        if self.config.critical_queue(name) {
            Err(ManagerError::CriticalQueueProtected {
                queue: name.to_string(),
                operation,
            })
        } else {
            Ok(())
        }
    }

    async fn cache_status(&self, name: &str, status: &str) {
        if !self.config.enable_caching {
            return;
        }
        if let Err(err) = self
            .backend
            .cache_queue_status(name, status, self.config.cache_ttl_secs)
            .await
        {
            warn!(queue = name, %err, "Failed to update queue status cache");
        }
    }

    pub async fn pause(&self, name: &str) -> Result<(), ManagerError> {
        self.validate(name).await?;
        self.reject_critical(name, "pause")?;
        self.pause_known(name).await
    }

    pub async fn resume(&self, name: &str) -> Result<(), ManagerError> {
        self.validate(name).await?;
        self.resume_known(name).await
    }

    // Bulk entry points skip registry re-validation per queue; the sweep
    // already iterates a registry snapshot.
    async fn pause_known(&self, name: &str) -> Result<(), ManagerError> {
        let ack = self.backend.pause_queue(name).await?;
        if !ack.applied() {
            return Err(ManagerError::Unacknowledged {
                operation: "pause",
                queue: name.to_string(),
                code: ack.0,
            });
        }
        self.cache_status(name, "paused").await;
        self.log_op(&format!("Queue '{name}' paused - result: {}", ack.0));
        Ok(())
    }

    async fn resume_known(&self, name: &str) -> Result<(), ManagerError> {
        let ack = self.backend.resume_queue(name).await?;
        if !ack.applied() {
            return Err(ManagerError::Unacknowledged {
                operation: "resume",
                queue: name.to_string(),
                code: ack.0,
            });
        }
        self.cache_status(name, "active").await;
        let already = if ack.0 == 0 { " (already active)" } else { "" };
        self.log_op(&format!("Queue '{name}' resumed - result: {}{already}", ack.0));
        Ok(())
    }

    pub async fn bulk_pause(&self) -> Result<BulkOutcome, ManagerError> {
        self.bulk("pause").await
    }

    pub async fn bulk_resume(&self) -> Result<BulkOutcome, ManagerError> {
        self.bulk("resume").await
    }

    async fn bulk(&self, verb: &'static str) -> Result<BulkOutcome, ManagerError> {
        let mut outcome = BulkOutcome::default();

        for name in self.registry.list_queues().await? {
            if self.config.critical_queue(&name) {
                outcome.skipped += 1;
                continue;
            }

            let result = match verb {
                "pause" => self.pause_known(&name).await,
                _ => self.resume_known(&name).await,
            };

            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(err) => {
                    warn!(queue = %name, %err, "Bulk {verb} failed for queue");
                    outcome.failed.push(name);
                }
            }
        }

        self.log_op(&format!(
            "Bulk {verb} completed. Succeeded: {}, Skipped: {}, Failed: {}",
            outcome.succeeded,
            outcome.skipped,
            outcome.failed.len()
        ));
        Ok(outcome)
    }

    /// Single dispatch point for the limit/block attribute toggles.
    pub async fn apply(&self, name: &str, op: QueueOp) -> Result<(), ManagerError> {
        self.validate(name).await?;

        match op {
            QueueOp::SetLimit(limit) => {
                let limit = positive(limit)?;
                self.backend.set_queue_limit(name, limit).await?;
                self.log_op(&format!("Queue '{name}' limit set to {limit}"));
            }
            QueueOp::RemoveLimit => {
                self.backend.remove_queue_limit(name).await?;
                self.log_op(&format!("Queue '{name}' limit removed"));
            }
            QueueOp::SetProcessLimit(limit) => {
                let limit = positive(limit)?;
                self.backend.set_queue_process_limit(name, limit).await?;
                self.log_op(&format!("Queue '{name}' process_limit set to {limit}"));
            }
            QueueOp::RemoveProcessLimit => {
                self.backend.remove_queue_process_limit(name).await?;
                self.log_op(&format!("Queue '{name}' process_limit removed"));
            }
            QueueOp::Block => {
                self.backend.block_queue(name).await?;
                self.log_op(&format!("Queue '{name}' blocked"));
            }
            QueueOp::Unblock => {
                self.backend.unblock_queue(name).await?;
                self.log_op(&format!("Queue '{name}' unblocked"));
            }
        }
        Ok(())
    }

    /// Removes all jobs currently in the queue; returns the count removed,
    /// best effort against concurrent enqueues.
    pub async fn clear(&self, name: &str) -> Result<u64, ManagerError> {
        self.validate(name).await?;
        self.reject_critical(name, "clear")?;

        let cleared = self.backend.clear_queue(name).await?;
        self.log_op(&format!("Queue '{name}' cleared - {cleared} jobs removed"));
        Ok(cleared)
    }

    /// Clears the queue and purges its identity keys so a subsequent
    /// discovery pass no longer reports it.
    pub async fn delete(&self, name: &str) -> Result<u64, ManagerError> {
        self.validate(name).await?;
        self.reject_critical(name, "delete")?;

        let cleared = self.backend.drop_queue(name).await?;
        self.log_op(&format!(
            "Queue '{name}' deleted completely - {cleared} jobs removed"
        ));
        Ok(cleared)
    }

    pub async fn status(&self, name: &str) -> Result<QueueStatus, ManagerError> {
        self.validate(name).await?;

        Ok(QueueStatus {
            name: name.to_string(),
            size: self.backend.queue_size(name).await?,
            latency: round2(self.backend.queue_latency(name).await?),
            paused: self.backend.queue_paused(name).await?,
            critical: self.config.critical_queue(name),
            priority: self.config.queue_priority(name),
        })
    }

    pub async fn jobs(
        &self,
        name: &str,
        page: usize,
        per_page: usize,
    ) -> Result<QueueJobsPage, ManagerError> {
        self.validate(name).await?;

        let size = self.backend.queue_size(name).await?;
        let latency = round2(self.backend.queue_latency(name).await?);
        let all = self.backend.queue_jobs(name).await?;

        let pagination = Pagination::new(page, per_page, size as usize);
        let offset = pagination.offset();
        let jobs = all
            .into_iter()
            .skip(offset)
            .take(per_page)
            .enumerate()
            .map(|(i, job)| QueuedJobView {
                position: offset + i + 1,
                jid: job.jid,
                class: job.class,
                args: job.args,
                queue: job.queue,
                created_at: format_epoch(job.created_at),
                enqueued_at: format_epoch(job.enqueued_at),
                retry_count: job.retry_count,
            })
            .collect();

        Ok(QueueJobsPage {
            queue_name: name.to_string(),
            size,
            latency,
            jobs,
            pagination,
        })
    }

    pub async fn delete_job(&self, name: &str, job_id: &str) -> Result<(), ManagerError> {
        self.validate(name).await?;
        if job_id.trim().is_empty() {
            return Err(ManagerError::InvalidJobId);
        }

        if self.backend.delete_queued_job(name, job_id).await? {
            self.log_op(&format!("Job {job_id} deleted from queue '{name}'"));
            Ok(())
        } else {
            Err(ManagerError::JobNotFound {
                set: "Queue",
                id: job_id.to_string(),
            })
        }
    }
}

fn positive(limit: i64) -> Result<u64, ManagerError> {
    if limit > 0 {
        Ok(limit as u64)
    } else {
        Err(ManagerError::InvalidLimit)
    }
}
