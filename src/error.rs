// src/error.rs
use thiserror::Error;

/// Failures raised by the backing store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failures surfaced by the management services. Validation variants are
/// produced before any store call; `Backend` wraps store failures caught at
/// the operation boundary.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Invalid queue name: {0}")]
    InvalidQueue(String),

    #[error("Cannot {operation} critical queue '{queue}'")]
    CriticalQueueProtected {
        queue: String,
        operation: &'static str,
    },

    #[error("Invalid job ID")]
    InvalidJobId,

    #[error("{set} job not found: {id}")]
    JobNotFound { set: &'static str, id: String },

    #[error("Invalid limit")]
    InvalidLimit,

    #[error("Failed to {operation} queue '{queue}': unexpected result '{code}'")]
    Unacknowledged {
        operation: &'static str,
        queue: String,
        code: i64,
    },

    #[error("Backing store unavailable: {0}")]
    Backend(#[from] StoreError),

    #[error("Client disconnected from live stream")]
    StreamDisconnected,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
