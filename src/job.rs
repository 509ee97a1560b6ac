// src/job.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A job payload as the backing engine stores it, either inside a queue list
/// or as a member of the scheduled/retry/dead sets. Which optional fields are
/// populated depends on the collection the job currently lives in. Fields the
/// manager does not model are carried through `extra` untouched so that
/// cross-set moves never lose data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub jid: String,
    pub class: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<f64>,
    #[serde(default)]
    pub retry_count: u32,

    /// Scheduled execution time (scheduled set only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<f64>,

    /// Next attempt time (retry set only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<f64>,
    #[serde(default, rename = "retry", skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_backtrace: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_queue() -> String {
    "default".to_string()
}

impl JobRecord {
    /// Case-sensitive substring match on the job class name.
    pub fn class_matches(&self, filter: &str) -> bool {
        self.class.contains(filter)
    }
}
