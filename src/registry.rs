// src/registry.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::error::ManagerError;
use crate::store::QueueBackend;

/// Discovers every queue the engine knows about. No single source is
/// complete in all engine configurations, so three are unioned: the engine's
/// registered-queue entries, the membership set, and a key-pattern scan.
#[derive(Clone)]
pub struct QueueRegistry {
    backend: Arc<dyn QueueBackend>,
}

impl QueueRegistry {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        QueueRegistry { backend }
    }

    /// All known queue names, deduplicated and sorted. A failing strategy is
    /// logged and skipped; only when every strategy fails is the error
    /// surfaced, so that "zero queues" always means an actually empty system.
    pub async fn list_queues(&self) -> Result<Vec<String>, ManagerError> {
        let mut names = BTreeSet::new();
        let mut failures = 0;
        let mut last_error = None;

        match self.backend.registered_queues().await {
            Ok(found) => names.extend(found),
            Err(err) => {
                warn!(%err, "Queue discovery via registered entries failed");
                failures += 1;
                last_error = Some(err);
            }
        }

        match self.backend.active_queues().await {
            Ok(found) => names.extend(found),
            Err(err) => {
                warn!(%err, "Queue discovery via membership set failed");
                failures += 1;
                last_error = Some(err);
            }
        }

        match self.backend.scan_queue_keys().await {
            Ok(found) => names.extend(found),
            Err(err) => {
                warn!(%err, "Queue discovery via key scan failed");
                failures += 1;
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) if failures == 3 => Err(ManagerError::Backend(err)),
            _ => Ok(names.into_iter().collect()),
        }
    }

    pub async fn contains(&self, name: &str) -> Result<bool, ManagerError> {
        Ok(self.list_queues().await?.iter().any(|queue| queue == name))
    }
}
