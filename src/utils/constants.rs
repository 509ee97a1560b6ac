// src/utils/constants.rs

// ---------------------------------------------------------
// General
// ---------------------------------------------------------
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PER_PAGE: usize = 25;
pub const DEFAULT_QUEUE_PAGE_SIZE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;
pub const DEFAULT_QUEUE_PRIORITY: u32 = 1;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Lines of a dead job's backtrace exposed in listings.
pub const BACKTRACE_LINES: usize = 5;

// ---------------------------------------------------------
// Redis keys
// ---------------------------------------------------------
pub const QUEUES_SET: &str = "queues";
pub const PREFIX_QUEUE: &str = "queue";

// Sorted sets holding deferred / failing / exhausted jobs.
pub const SCHEDULED_SET_KEY: &str = "schedule";
pub const RETRY_SET_KEY: &str = "retry";
pub const DEAD_SET_KEY: &str = "dead";

// Engine bookkeeping.
pub const PROCESSES_SET: &str = "processes";
pub const PREFIX_PROCESS: &str = "process";
pub const STAT_PROCESSED_KEY: &str = "stat:processed";
pub const STAT_FAILED_KEY: &str = "stat:failed";

// Manager-owned status cache, written on pause/resume when caching is on.
pub const STATUS_CACHE_PREFIX: &str = "qdeck:status";
