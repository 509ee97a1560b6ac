//! Shared test support: an in-memory `QueueBackend` with per-strategy and
//! per-capability failure injection, plus small builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use qdeck::config::ManagerConfig;
use qdeck::error::StoreError;
use qdeck::job::JobRecord;
use qdeck::registry::QueueRegistry;
use qdeck::services::jobset_service::JobSetService;
use qdeck::services::metrics_service::MetricsService;
use qdeck::services::queue_service::QueueService;
use qdeck::store::{now_epoch, Ack, JobSet, QueueBackend, StoreResult};

#[derive(Default)]
pub struct MemoryState {
    pub queues: BTreeMap<String, Vec<JobRecord>>,
    pub queue_set: BTreeSet<String>,
    pub registered: BTreeSet<String>,
    pub paused: BTreeSet<String>,
    pub limits: HashMap<String, u64>,
    pub process_limits: HashMap<String, u64>,
    pub blocked: BTreeSet<String>,
    pub scheduled: Vec<(f64, JobRecord)>,
    pub retry: Vec<(f64, JobRecord)>,
    pub dead: Vec<(f64, JobRecord)>,
    pub processed: u64,
    pub failed: u64,
    pub processes: Vec<(u64, u64)>, // (busy, concurrency)
    pub busy: HashMap<String, u64>,
    pub status_cache: HashMap<String, String>,
}

impl MemoryState {
    fn set_mut(&mut self, set: JobSet) -> &mut Vec<(f64, JobRecord)> {
        match set {
            JobSet::Scheduled => &mut self.scheduled,
            JobSet::Retry => &mut self.retry,
            JobSet::Dead => &mut self.dead,
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    pub state: Mutex<MemoryState>,
    pub fail_registered: AtomicBool,
    pub fail_active: AtomicBool,
    pub fail_scan: AtomicBool,
    pub fail_stats: AtomicBool,
    pub fail_capabilities: AtomicBool,
    /// Count of mutating backend calls, for asserting that validation
    /// failures never reach the store.
    pub mutation_calls: AtomicUsize,
}

fn injected() -> StoreError {
    StoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "injected failure",
    )))
}

fn hydrate(set: JobSet, score: f64, job: &mut JobRecord) {
    match set {
        JobSet::Scheduled => {
            job.at.get_or_insert(score);
        }
        JobSet::Retry => {
            job.retry_at.get_or_insert(score);
        }
        JobSet::Dead => {
            job.failed_at.get_or_insert(score);
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_queue(&self, name: &str, jobs: Vec<JobRecord>) {
        let mut state = self.state.lock().unwrap();
        state.queue_set.insert(name.to_string());
        state.queues.insert(name.to_string(), jobs);
    }

    pub fn register_queue(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .registered
            .insert(name.to_string());
    }

    pub fn push_set(&self, set: JobSet, score: f64, job: JobRecord) {
        self.state.lock().unwrap().set_mut(set).push((score, job));
    }

    pub fn mutations(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    fn track_mutation(&self) {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn registered_queues(&self) -> StoreResult<Vec<String>> {
        if self.fail_registered.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .registered
            .iter()
            .cloned()
            .collect())
    }

    async fn active_queues(&self) -> StoreResult<Vec<String>> {
        if self.fail_active.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .queue_set
            .iter()
            .cloned()
            .collect())
    }

    async fn scan_queue_keys(&self) -> StoreResult<Vec<String>> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.state.lock().unwrap().queues.keys().cloned().collect())
    }

    async fn queue_size(&self, name: &str) -> StoreResult<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .queues
            .get(name)
            .map_or(0, |jobs| jobs.len() as u64))
    }

    async fn queue_latency(&self, name: &str) -> StoreResult<f64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .queues
            .get(name)
            .and_then(|jobs| jobs.first())
            .and_then(|job| job.enqueued_at)
            .map_or(0.0, |enqueued| (now_epoch() - enqueued).max(0.0)))
    }

    async fn queue_paused(&self, name: &str) -> StoreResult<bool> {
        Ok(self.state.lock().unwrap().paused.contains(name))
    }

    async fn busy_for_queue(&self, name: &str) -> StoreResult<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .busy
            .get(name)
            .copied()
            .unwrap_or(0))
    }

    async fn queue_limit(&self, name: &str) -> StoreResult<Option<u64>> {
        if self.fail_capabilities.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.state.lock().unwrap().limits.get(name).copied())
    }

    async fn queue_process_limit(&self, name: &str) -> StoreResult<Option<u64>> {
        if self.fail_capabilities.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .process_limits
            .get(name)
            .copied())
    }

    async fn queue_blocked(&self, name: &str) -> StoreResult<Option<bool>> {
        if self.fail_capabilities.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(Some(self.state.lock().unwrap().blocked.contains(name)))
    }

    async fn pause_queue(&self, name: &str) -> StoreResult<Ack> {
        self.track_mutation();
        let inserted = self.state.lock().unwrap().paused.insert(name.to_string());
        Ok(Ack(i64::from(inserted)))
    }

    async fn resume_queue(&self, name: &str) -> StoreResult<Ack> {
        self.track_mutation();
        let removed = self.state.lock().unwrap().paused.remove(name);
        Ok(Ack(i64::from(removed)))
    }

    async fn set_queue_limit(&self, name: &str, limit: u64) -> StoreResult<()> {
        self.track_mutation();
        self.state
            .lock()
            .unwrap()
            .limits
            .insert(name.to_string(), limit);
        Ok(())
    }

    async fn remove_queue_limit(&self, name: &str) -> StoreResult<()> {
        self.track_mutation();
        self.state.lock().unwrap().limits.remove(name);
        Ok(())
    }

    async fn set_queue_process_limit(&self, name: &str, limit: u64) -> StoreResult<()> {
        self.track_mutation();
        self.state
            .lock()
            .unwrap()
            .process_limits
            .insert(name.to_string(), limit);
        Ok(())
    }

    async fn remove_queue_process_limit(&self, name: &str) -> StoreResult<()> {
        self.track_mutation();
        self.state.lock().unwrap().process_limits.remove(name);
        Ok(())
    }

    async fn block_queue(&self, name: &str) -> StoreResult<()> {
        self.track_mutation();
        self.state.lock().unwrap().blocked.insert(name.to_string());
        Ok(())
    }

    async fn unblock_queue(&self, name: &str) -> StoreResult<()> {
        self.track_mutation();
        self.state.lock().unwrap().blocked.remove(name);
        Ok(())
    }

    async fn clear_queue(&self, name: &str) -> StoreResult<u64> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        match state.queues.get_mut(name) {
            Some(jobs) => {
                let cleared = jobs.len() as u64;
                jobs.clear();
                Ok(cleared)
            }
            None => Ok(0),
        }
    }

    async fn drop_queue(&self, name: &str) -> StoreResult<u64> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let cleared = state.queues.remove(name).map_or(0, |jobs| jobs.len() as u64);
        state.queue_set.remove(name);
        state.registered.remove(name);
        state.paused.remove(name);
        state.limits.remove(name);
        state.process_limits.remove(name);
        state.blocked.remove(name);
        state.busy.remove(name);
        Ok(cleared)
    }

    async fn queue_jobs(&self, name: &str) -> StoreResult<Vec<JobRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .queues
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_queued_job(&self, name: &str, jid: &str) -> StoreResult<bool> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let Some(jobs) = state.queues.get_mut(name) else {
            return Ok(false);
        };
        match jobs.iter().position(|job| job.jid == jid) {
            Some(index) => {
                jobs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_size(&self, set: JobSet) -> StoreResult<u64> {
        Ok(self.state.lock().unwrap().set_mut(set).len() as u64)
    }

    async fn set_jobs(&self, set: JobSet) -> StoreResult<Vec<JobRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .set_mut(set)
            .iter()
            .map(|(score, job)| {
                let mut job = job.clone();
                hydrate(set, *score, &mut job);
                job
            })
            .collect())
    }

    async fn find_in_set(&self, set: JobSet, jid: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .set_mut(set)
            .iter()
            .find(|(_, job)| job.jid == jid)
            .map(|(score, job)| {
                let mut job = job.clone();
                hydrate(set, *score, &mut job);
                job
            }))
    }

    async fn remove_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let jobs = state.set_mut(set);
        let before = jobs.len();
        jobs.retain(|(_, job)| job.jid != jid);
        Ok(jobs.len() < before)
    }

    async fn clear_set(&self, set: JobSet) -> StoreResult<u64> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let jobs = state.set_mut(set);
        let cleared = jobs.len() as u64;
        jobs.clear();
        Ok(cleared)
    }

    async fn enqueue_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let jobs = state.set_mut(set);
        let Some(index) = jobs.iter().position(|(_, job)| job.jid == jid) else {
            return Ok(false);
        };

        let (_, mut job) = jobs.remove(index);
        job.at = None;
        job.retry_at = None;
        job.enqueued_at = Some(now_epoch());

        state.queue_set.insert(job.queue.clone());
        state.queues.entry(job.queue.clone()).or_default().push(job);
        Ok(true)
    }

    async fn kill_retry_job(&self, jid: &str) -> StoreResult<bool> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.retry.iter().position(|(_, job)| job.jid == jid) else {
            return Ok(false);
        };

        let (_, mut job) = state.retry.remove(index);
        let died_at = now_epoch();
        job.retry_at = None;
        job.failed_at = Some(died_at);
        state.dead.push((died_at, job));
        Ok(true)
    }

    async fn resurrect_dead_job(&self, jid: &str) -> StoreResult<bool> {
        self.track_mutation();
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.dead.iter().position(|(_, job)| job.jid == jid) else {
            return Ok(false);
        };

        let (_, mut job) = state.dead.remove(index);
        let due_at = now_epoch();
        job.retry_at = Some(due_at);
        state.retry.push((due_at, job));
        Ok(true)
    }

    async fn processed_total(&self) -> StoreResult<u64> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.state.lock().unwrap().processed)
    }

    async fn failed_total(&self) -> StoreResult<u64> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.state.lock().unwrap().failed)
    }

    async fn busy_workers(&self) -> StoreResult<u64> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .processes
            .iter()
            .map(|(busy, _)| busy)
            .sum())
    }

    async fn process_count(&self) -> StoreResult<u64> {
        Ok(self.state.lock().unwrap().processes.len() as u64)
    }

    async fn worker_count(&self) -> StoreResult<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .processes
            .iter()
            .map(|(_, concurrency)| concurrency)
            .sum())
    }

    async fn cache_queue_status(
        &self,
        name: &str,
        status: &str,
        _ttl_secs: u64,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .status_cache
            .insert(name.to_string(), status.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------
// Builders
// ---------------------------------------------------------

pub fn job(jid: &str, class: &str, queue: &str) -> JobRecord {
    JobRecord {
        jid: jid.to_string(),
        class: class.to_string(),
        args: serde_json::json!([]),
        queue: queue.to_string(),
        created_at: None,
        enqueued_at: None,
        retry_count: 0,
        at: None,
        retry_at: None,
        retry_limit: None,
        failed_at: None,
        error_class: None,
        error_message: None,
        error_backtrace: None,
        extra: serde_json::Map::new(),
    }
}

pub fn config_with_critical(critical: &[&str]) -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.critical_queues = critical.iter().map(|s| s.to_string()).collect();
    config
}

pub fn queue_service(backend: &Arc<MemoryBackend>, config: ManagerConfig) -> QueueService {
    let backend: Arc<dyn QueueBackend> = backend.clone();
    QueueService::new(
        backend.clone(),
        QueueRegistry::new(backend),
        Arc::new(config),
    )
}

pub fn jobset_service(backend: &Arc<MemoryBackend>) -> JobSetService {
    let backend: Arc<dyn QueueBackend> = backend.clone();
    JobSetService::new(backend, Arc::new(ManagerConfig::default()))
}

pub fn metrics_service(backend: &Arc<MemoryBackend>, config: ManagerConfig) -> MetricsService {
    let backend: Arc<dyn QueueBackend> = backend.clone();
    MetricsService::new(
        backend.clone(),
        QueueRegistry::new(backend),
        Arc::new(config),
    )
}
