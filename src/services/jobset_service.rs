// src/services/jobset_service.rs

//! Paginated, filtered, sorted access to the scheduled/retry/dead sets,
//! including the cross-collection moves (retry -> dead, dead -> retry,
//! scheduled -> queue).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::job::JobRecord;
use crate::store::{now_epoch, JobSet, QueueBackend};
use crate::utils::constants::BACKTRACE_LINES;
use crate::utils::pagination::{PageQuery, Pagination};
use crate::utils::relative_time::{format_epoch, time_ago_in_words, time_until_in_words};

/// Jobs from the retry set keep their configured attempt ceiling; older
/// payloads without one fall back to the engine default.
const DEFAULT_RETRY_LIMIT: u32 = 25;

/// One listed job, annotated with formatted timestamps and relative-time
/// strings. Which optional fields are present depends on the source set.
#[derive(Debug, Clone, Serialize)]
pub struct SetJobView {
    pub position: usize,
    pub jid: String,
    pub class: String,
    pub args: Value,
    pub queue: String,
    pub created_at: Option<String>,
    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at_epoch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_execution: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_epoch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_relative: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at_epoch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_relative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Vec<String>>,
}

impl SetJobView {
    fn build(set: JobSet, job: JobRecord, position: usize, now: f64) -> Self {
        let mut view = SetJobView {
            position,
            jid: job.jid,
            class: job.class,
            args: job.args,
            queue: job.queue,
            created_at: format_epoch(job.created_at),
            retry_count: job.retry_count,
            scheduled_at: None,
            scheduled_at_epoch: None,
            time_until_execution: None,
            failed_at: None,
            failed_at_epoch: None,
            failed_at_relative: None,
            retry_at: None,
            retry_at_epoch: None,
            next_retry_relative: None,
            retry_limit: None,
            error_class: None,
            error_message: None,
            backtrace: None,
        };

        match set {
            JobSet::Scheduled => {
                view.scheduled_at = format_epoch(job.at);
                view.scheduled_at_epoch = job.at;
                view.time_until_execution = Some(time_until_in_words(job.at, now));
            }
            JobSet::Retry => {
                view.failed_at = format_epoch(job.failed_at);
                view.failed_at_epoch = job.failed_at;
                view.failed_at_relative = Some(time_ago_in_words(job.failed_at, now));
                view.retry_at = format_epoch(job.retry_at);
                view.retry_at_epoch = job.retry_at;
                view.next_retry_relative = job
                    .retry_at
                    .map(|at| time_until_in_words(Some(at), now));
                view.retry_limit = Some(job.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT));
                view.error_class = job.error_class;
                view.error_message = job.error_message;
            }
            JobSet::Dead => {
                view.failed_at = format_epoch(job.failed_at);
                view.failed_at_epoch = job.failed_at;
                view.failed_at_relative = Some(time_ago_in_words(job.failed_at, now));
                view.error_class = job.error_class;
                view.error_message = job.error_message;
                view.backtrace = job
                    .error_backtrace
                    .map(|lines| lines.into_iter().take(BACKTRACE_LINES).collect());
            }
        }

        view
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSetPage {
    pub jobs: Vec<SetJobView>,
    pub total_count: u64,
    pub filtered_count: usize,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct JobSetService {
    backend: Arc<dyn QueueBackend>,
    config: Arc<ManagerConfig>,
}

impl JobSetService {
    pub fn new(backend: Arc<dyn QueueBackend>, config: Arc<ManagerConfig>) -> Self {
        JobSetService { backend, config }
    }

    fn log_op(&self, message: &str) {
        if self.config.enable_logging {
            info!("{message}");
        }
    }

    /// Snapshot the set, apply the class filter, and sort with the
    /// set-specific key: scheduled ascending by execution time, retry
    /// ascending by next attempt (falling back to failure time), dead most
    /// recent failure first.
    async fn matching_jobs(
        &self,
        set: JobSet,
        filter: Option<&str>,
    ) -> Result<Vec<JobRecord>, ManagerError> {
        let mut jobs = self.backend.set_jobs(set).await?;

        if let Some(filter) = filter {
            jobs.retain(|job| job.class_matches(filter));
        }

        match set {
            JobSet::Scheduled => {
                jobs.sort_by(|a, b| a.at.unwrap_or(0.0).total_cmp(&b.at.unwrap_or(0.0)));
            }
            JobSet::Retry => {
                jobs.sort_by(|a, b| retry_key(a).total_cmp(&retry_key(b)));
            }
            JobSet::Dead => {
                jobs.sort_by(|a, b| {
                    b.failed_at
                        .unwrap_or(0.0)
                        .total_cmp(&a.failed_at.unwrap_or(0.0))
                });
            }
        }

        Ok(jobs)
    }

    pub async fn list(&self, set: JobSet, query: &PageQuery) -> Result<JobSetPage, ManagerError> {
        let total_count = self.backend.set_size(set).await?;
        let jobs = self.matching_jobs(set, query.filter()).await?;
        let filtered_count = jobs.len();

        let page = query.page();
        let per_page = query.per_page();
        let pagination = Pagination::new(page, per_page, filtered_count);
        let offset = pagination.offset();
        let now = now_epoch();

        let views = jobs
            .into_iter()
            .skip(offset)
            .take(per_page)
            .enumerate()
            .map(|(i, job)| SetJobView::build(set, job, offset + i + 1, now))
            .collect();

        Ok(JobSetPage {
            jobs: views,
            total_count,
            filtered_count,
            pagination,
        })
    }

    /// Resolves the id through the set's find-by-id; blank ids are rejected
    /// before any store call.
    async fn require_job(&self, set: JobSet, jid: &str) -> Result<JobRecord, ManagerError> {
        if jid.trim().is_empty() {
            return Err(ManagerError::InvalidJobId);
        }

        self.backend
            .find_in_set(set, jid)
            .await?
            .ok_or_else(|| ManagerError::JobNotFound {
                set: set.label(),
                id: jid.to_string(),
            })
    }

    fn gone(set: JobSet, jid: &str) -> ManagerError {
        ManagerError::JobNotFound {
            set: set.label(),
            id: jid.to_string(),
        }
    }

    pub async fn delete(&self, set: JobSet, jid: &str) -> Result<(), ManagerError> {
        let job = self.require_job(set, jid).await?;

        if self.backend.remove_from_set(set, jid).await? {
            self.log_op(&format!("{} job {jid} ({}) deleted", set.label(), job.class));
            Ok(())
        } else {
            Err(Self::gone(set, jid))
        }
    }

    /// Scheduled set only: move the job into its origin queue now, bypassing
    /// the wait.
    pub async fn enqueue_now(&self, jid: &str) -> Result<(), ManagerError> {
        let job = self.require_job(JobSet::Scheduled, jid).await?;

        if self.backend.enqueue_from_set(JobSet::Scheduled, jid).await? {
            self.log_op(&format!(
                "Scheduled job {jid} ({}) enqueued immediately",
                job.class
            ));
            Ok(())
        } else {
            Err(Self::gone(JobSet::Scheduled, jid))
        }
    }

    /// Retry set only: re-enqueue immediately instead of waiting for the
    /// next attempt time.
    pub async fn retry_now(&self, jid: &str) -> Result<(), ManagerError> {
        let job = self.require_job(JobSet::Retry, jid).await?;

        if self.backend.enqueue_from_set(JobSet::Retry, jid).await? {
            self.log_op(&format!("Retry job {jid} ({}) retried immediately", job.class));
            Ok(())
        } else {
            Err(Self::gone(JobSet::Retry, jid))
        }
    }

    pub async fn kill(&self, jid: &str) -> Result<(), ManagerError> {
        let job = self.require_job(JobSet::Retry, jid).await?;

        if self.backend.kill_retry_job(jid).await? {
            self.log_op(&format!(
                "Retry job {jid} ({}) moved to dead queue",
                job.class
            ));
            Ok(())
        } else {
            Err(Self::gone(JobSet::Retry, jid))
        }
    }

    pub async fn resurrect(&self, jid: &str) -> Result<(), ManagerError> {
        let job = self.require_job(JobSet::Dead, jid).await?;

        if self.backend.resurrect_dead_job(jid).await? {
            self.log_op(&format!(
                "Dead job {jid} ({}) resurrected to retry queue",
                job.class
            ));
            Ok(())
        } else {
            Err(Self::gone(JobSet::Dead, jid))
        }
    }

    /// Clear the set, or just the jobs matching the filter. The count is
    /// best effort as of the snapshot.
    pub async fn clear(&self, set: JobSet, filter: Option<&str>) -> Result<u64, ManagerError> {
        let cleared = match filter {
            Some(filter) => {
                let mut cleared = 0;
                for job in self.matching_jobs(set, Some(filter)).await? {
                    if self.backend.remove_from_set(set, &job.jid).await? {
                        cleared += 1;
                    }
                }
                cleared
            }
            None => self.backend.clear_set(set).await?,
        };

        self.log_op(&format!("Cleared {cleared} {} jobs", set.label()));
        Ok(cleared)
    }

    /// Re-enqueue every currently-matching retry job; returns the processed
    /// count over the snapshot.
    pub async fn retry_all(&self, filter: Option<&str>) -> Result<u64, ManagerError> {
        let mut retried = 0;
        for job in self.matching_jobs(JobSet::Retry, filter).await? {
            if self
                .backend
                .enqueue_from_set(JobSet::Retry, &job.jid)
                .await?
            {
                retried += 1;
            }
        }

        self.log_op(&format!("Retried {retried} jobs"));
        Ok(retried)
    }

    /// Move every currently-matching dead job back to the retry set.
    pub async fn resurrect_all(&self, filter: Option<&str>) -> Result<u64, ManagerError> {
        let mut resurrected = 0;
        for job in self.matching_jobs(JobSet::Dead, filter).await? {
            if self.backend.resurrect_dead_job(&job.jid).await? {
                resurrected += 1;
            }
        }

        self.log_op(&format!("Resurrected {resurrected} dead jobs"));
        Ok(resurrected)
    }
}

fn retry_key(job: &JobRecord) -> f64 {
    job.retry_at.or(job.failed_at).unwrap_or(0.0)
}
