// src/services/metrics_service.rs

//! Aggregate statistics composed from the registry, the per-queue reads and
//! the job-set sizes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::registry::QueueRegistry;
use crate::store::{JobSet, QueueBackend};

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub processed: u64,
    pub failed: u64,
    pub busy: u64,
    pub enqueued: u64,
    pub processes: u64,
    pub workers: u64,
    pub scheduled_size: u64,
    pub retry_size: u64,
    pub dead_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub name: String,
    pub size: u64,
    pub latency: f64,
    pub paused: bool,
    pub critical: bool,
    pub priority: u32,
    pub busy: u64,
    pub limit: Option<u64>,
    pub process_limit: Option<u64>,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub global_stats: GlobalStats,
    pub queues: BTreeMap<String, QueueMetrics>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub total_queues: usize,
    pub total_enqueued: u64,
    pub total_busy: u64,
    pub paused_queues: usize,
    pub critical_queues: usize,
}

#[derive(Clone)]
pub struct MetricsService {
    backend: Arc<dyn QueueBackend>,
    registry: QueueRegistry,
    config: Arc<ManagerConfig>,
}

impl MetricsService {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        registry: QueueRegistry,
        config: Arc<ManagerConfig>,
    ) -> Self {
        MetricsService {
            backend,
            registry,
            config,
        }
    }

    pub async fn compute(&self) -> Result<MetricsSnapshot, ManagerError> {
        let names = self.registry.list_queues().await?;

        let mut queues = BTreeMap::new();
        let mut enqueued = 0;
        for name in names {
            let metrics = self.queue_metrics(&name).await?;
            enqueued += metrics.size;
            queues.insert(name, metrics);
        }

        let global_stats = GlobalStats {
            processed: self.backend.processed_total().await?,
            failed: self.backend.failed_total().await?,
            // Read directly rather than summed from the per-queue counters,
            // so the two stay independently verifiable.
            busy: self.backend.busy_workers().await?,
            enqueued,
            processes: self.backend.process_count().await?,
            workers: self.backend.worker_count().await?,
            scheduled_size: self.backend.set_size(JobSet::Scheduled).await?,
            retry_size: self.backend.set_size(JobSet::Retry).await?,
            dead_size: self.backend.set_size(JobSet::Dead).await?,
        };

        Ok(MetricsSnapshot {
            global_stats,
            queues,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    pub async fn summary(&self) -> Result<QueueSummary, ManagerError> {
        let snapshot = self.compute().await?;

        Ok(QueueSummary {
            total_queues: snapshot.queues.len(),
            total_enqueued: snapshot.global_stats.enqueued,
            total_busy: snapshot.global_stats.busy,
            paused_queues: snapshot.queues.values().filter(|q| q.paused).count(),
            critical_queues: snapshot.queues.values().filter(|q| q.critical).count(),
        })
    }

    async fn queue_metrics(&self, name: &str) -> Result<QueueMetrics, ManagerError> {
        // Limit, process-limit and blocked are optional backend extensions;
        // absence or failure resolves to the unconstrained default instead of
        // failing the whole aggregation.
        let limit = self.capability(name, self.backend.queue_limit(name).await);
        let process_limit = self.capability(name, self.backend.queue_process_limit(name).await);
        let blocked = self
            .capability(name, self.backend.queue_blocked(name).await)
            .unwrap_or(false);

        Ok(QueueMetrics {
            name: name.to_string(),
            size: self.backend.queue_size(name).await?,
            latency: {
                let latency = self.backend.queue_latency(name).await?;
                (latency * 100.0).round() / 100.0
            },
            paused: self.backend.queue_paused(name).await?,
            critical: self.config.critical_queue(name),
            priority: self.config.queue_priority(name),
            busy: self.backend.busy_for_queue(name).await?,
            limit,
            process_limit,
            blocked,
        })
    }

    fn capability<T>(
        &self,
        name: &str,
        result: Result<Option<T>, crate::error::StoreError>,
    ) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(err) => {
                debug!(queue = name, %err, "Optional queue attribute unavailable");
                None
            }
        }
    }
}
