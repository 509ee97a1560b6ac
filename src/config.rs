// src/config.rs
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::ManagerError;
use crate::utils::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_QUEUE_PRIORITY, DEFAULT_REFRESH_INTERVAL_MS,
};

/// Behavior knobs for the management plane. Built once at startup and passed
/// into each component by the constructor; components never read process-wide
/// state.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Queues exempt from pause/clear/delete and skipped by bulk operations.
    pub critical_queues: HashSet<String>,
    /// Relative priority per queue name; unlisted queues get priority 1.
    pub queue_priorities: HashMap<String, u32>,
    /// Delay between live-feed polls, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Emit an info-level log line for every queue operation.
    pub enable_logging: bool,
    /// Write a short-lived status marker on pause/resume.
    pub enable_caching: bool,
    pub cache_ttl_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            critical_queues: HashSet::new(),
            queue_priorities: HashMap::new(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            enable_logging: true,
            enable_caching: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.refresh_interval_ms == 0 {
            return Err(ManagerError::Config(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn critical_queue(&self, name: &str) -> bool {
        self.critical_queues.contains(name)
    }

    pub fn queue_priority(&self, name: &str) -> u32 {
        self.queue_priorities
            .get(name)
            .copied()
            .unwrap_or(DEFAULT_QUEUE_PRIORITY)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_refresh_interval() {
        let cfg = ManagerConfig {
            refresh_interval_ms: 0,
            ..ManagerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unlisted_queue_gets_default_priority() {
        let mut cfg = ManagerConfig::default();
        cfg.queue_priorities.insert("mailers".to_string(), 8);
        assert_eq!(cfg.queue_priority("mailers"), 8);
        assert_eq!(cfg.queue_priority("default"), 1);
        assert!(!cfg.critical_queue("default"));
    }
}
