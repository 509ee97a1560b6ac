// src/store.rs

//! Backing store adapter: the trait the management services talk to, plus
//! the Redis implementation speaking the engine's native key layout.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::warn;

use crate::error::StoreError;
use crate::job::JobRecord;
use crate::utils::constants::{
    DEAD_SET_KEY, PREFIX_PROCESS, PREFIX_QUEUE, PROCESSES_SET, QUEUES_SET, RETRY_SET_KEY,
    SCHEDULED_SET_KEY, STATUS_CACHE_PREFIX, STAT_FAILED_KEY, STAT_PROCESSED_KEY,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// The three auxiliary job collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobSet {
    Scheduled,
    Retry,
    Dead,
}

impl JobSet {
    pub fn key(self) -> &'static str {
        match self {
            JobSet::Scheduled => SCHEDULED_SET_KEY,
            JobSet::Retry => RETRY_SET_KEY,
            JobSet::Dead => DEAD_SET_KEY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobSet::Scheduled => "Scheduled",
            JobSet::Retry => "Retry",
            JobSet::Dead => "Dead",
        }
    }

    /// Path segment used by the HTTP surface.
    pub fn from_path(segment: &str) -> Option<JobSet> {
        match segment {
            "scheduled" => Some(JobSet::Scheduled),
            "retries" => Some(JobSet::Retry),
            "dead" => Some(JobSet::Dead),
            _ => None,
        }
    }
}

/// Raw acknowledgement code from a pause/resume call. The engine reports 1
/// when the flag changed and 0 when it was already in the requested state;
/// both count as applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub i64);

impl Ack {
    pub fn applied(self) -> bool {
        matches!(self.0, 0 | 1)
    }
}

/// Access to the job-queue engine's shared state. One production
/// implementation over Redis; tests provide an in-memory fake.
///
/// Capability reads (`queue_limit`, `queue_process_limit`, `queue_blocked`)
/// return `None` when the attribute is unset or the backing extension is not
/// installed; callers branch on presence instead of catching errors.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    // Discovery. No single source is complete in every engine configuration,
    // so the registry unions all three.
    async fn registered_queues(&self) -> StoreResult<Vec<String>>;
    async fn active_queues(&self) -> StoreResult<Vec<String>>;
    async fn scan_queue_keys(&self) -> StoreResult<Vec<String>>;

    // Per-queue reads.
    async fn queue_size(&self, name: &str) -> StoreResult<u64>;
    async fn queue_latency(&self, name: &str) -> StoreResult<f64>;
    async fn queue_paused(&self, name: &str) -> StoreResult<bool>;
    async fn busy_for_queue(&self, name: &str) -> StoreResult<u64>;
    async fn queue_limit(&self, name: &str) -> StoreResult<Option<u64>>;
    async fn queue_process_limit(&self, name: &str) -> StoreResult<Option<u64>>;
    async fn queue_blocked(&self, name: &str) -> StoreResult<Option<bool>>;

    // Per-queue writes.
    async fn pause_queue(&self, name: &str) -> StoreResult<Ack>;
    async fn resume_queue(&self, name: &str) -> StoreResult<Ack>;
    async fn set_queue_limit(&self, name: &str, limit: u64) -> StoreResult<()>;
    async fn remove_queue_limit(&self, name: &str) -> StoreResult<()>;
    async fn set_queue_process_limit(&self, name: &str, limit: u64) -> StoreResult<()>;
    async fn remove_queue_process_limit(&self, name: &str) -> StoreResult<()>;
    async fn block_queue(&self, name: &str) -> StoreResult<()>;
    async fn unblock_queue(&self, name: &str) -> StoreResult<()>;
    /// Remove every job currently in the queue; returns the count removed.
    async fn clear_queue(&self, name: &str) -> StoreResult<u64>;
    /// Clear the queue and purge its identity from every registry-visible
    /// location (membership set, list key, marker keys).
    async fn drop_queue(&self, name: &str) -> StoreResult<u64>;

    // Queue contents.
    async fn queue_jobs(&self, name: &str) -> StoreResult<Vec<JobRecord>>;
    async fn delete_queued_job(&self, name: &str, jid: &str) -> StoreResult<bool>;

    // Job sets.
    async fn set_size(&self, set: JobSet) -> StoreResult<u64>;
    async fn set_jobs(&self, set: JobSet) -> StoreResult<Vec<JobRecord>>;
    async fn find_in_set(&self, set: JobSet, jid: &str) -> StoreResult<Option<JobRecord>>;
    async fn remove_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool>;
    async fn clear_set(&self, set: JobSet) -> StoreResult<u64>;
    /// Move a job from the set into its origin queue, stamping `enqueued_at`.
    async fn enqueue_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool>;
    /// Retry set -> dead set; `retry_at` is dropped and `failed_at` stamped.
    async fn kill_retry_job(&self, jid: &str) -> StoreResult<bool>;
    /// Dead set -> retry set, stamped for an immediate re-attempt.
    async fn resurrect_dead_job(&self, jid: &str) -> StoreResult<bool>;

    // Global stats.
    async fn processed_total(&self) -> StoreResult<u64>;
    async fn failed_total(&self) -> StoreResult<u64>;
    async fn busy_workers(&self) -> StoreResult<u64>;
    async fn process_count(&self) -> StoreResult<u64>;
    async fn worker_count(&self) -> StoreResult<u64>;

    /// Manager-owned status marker, written on pause/resume when caching is
    /// enabled. Best effort; callers ignore failures.
    async fn cache_queue_status(&self, name: &str, status: &str, ttl_secs: u64)
        -> StoreResult<()>;
}

pub fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Redis-backed implementation over the engine's native layout: a `queues`
/// membership set, one list per queue holding job payload JSON, and the
/// `schedule`/`retry`/`dead` sorted sets scored by epoch seconds.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

fn queue_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}")
}

fn paused_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}:paused")
}

fn limit_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}:limit")
}

fn process_limit_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}:process_limit")
}

fn blocked_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}:blocked")
}

fn busy_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:{name}:busy")
}

fn engine_config_key(name: &str) -> String {
    format!("{PREFIX_QUEUE}:config:{name}")
}

fn parse_member(raw: &str) -> Option<JobRecord> {
    match serde_json::from_str::<JobRecord>(raw) {
        Ok(job) => Some(job),
        Err(err) => {
            warn!(%err, "Skipping unparseable job payload");
            None
        }
    }
}

/// The sorted-set score is authoritative for the set's timing field; older
/// payloads may not carry it inline.
fn hydrate_score(set: JobSet, score: f64, job: &mut JobRecord) {
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

impl RedisBackend {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(RedisBackend { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn find_raw(&self, set: JobSet, jid: &str) -> StoreResult<Option<(String, f64, JobRecord)>> {
        let mut conn = self.conn();
        let members: Vec<(String, f64)> = conn.zrange_withscores(set.key(), 0, -1).await?;

        for (raw, score) in members {
            if let Some(mut job) = parse_member(&raw) {
                if job.jid == jid {
                    hydrate_score(set, score, &mut job);
                    return Ok(Some((raw, score, job)));
                }
            }
        }
        Ok(None)
    }

    async fn push_to_queue(&self, job: &JobRecord) -> StoreResult<()> {
        let mut conn = self.conn();
        let payload = serde_json::to_string(job)?;
        let _: i64 = conn.rpush(queue_key(&job.queue), payload).await?;
        let _: i64 = conn.sadd(QUEUES_SET, &job.queue).await?;
        Ok(())
    }

    async fn sum_process_field(&self, field: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(PROCESSES_SET).await?;
        let mut total = 0;
        for id in ids {
            let value: Option<u64> = conn.hget(format!("{PREFIX_PROCESS}:{id}"), field).await?;
            total += value.unwrap_or(0);
        }
        Ok(total)
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn registered_queues(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn.keys(format!("{PREFIX_QUEUE}:config:*")).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&format!("{PREFIX_QUEUE}:config:"))
                    .map(String::from)
            })
            .collect())
    }

    async fn active_queues(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(QUEUES_SET).await?)
    }

    async fn scan_queue_keys(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn.keys(format!("{PREFIX_QUEUE}:*")).await?;
        // Marker and config keys carry an extra segment; plain queue names
        // never contain a colon.
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&format!("{PREFIX_QUEUE}:"))
                    .filter(|name| !name.is_empty() && !name.contains(':'))
                    .map(String::from)
            })
            .collect())
    }

    async fn queue_size(&self, name: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        Ok(conn.llen(queue_key(name)).await?)
    }

    async fn queue_latency(&self, name: &str) -> StoreResult<f64> {
        let mut conn = self.conn();
        // Jobs are appended at the tail, so the head is the oldest entry.
        let head: Option<String> = conn.lindex(queue_key(name), 0).await?;
        let latency = head
            .as_deref()
            .and_then(parse_member)
            .and_then(|job| job.enqueued_at)
            .map(|enqueued| (now_epoch() - enqueued).max(0.0))
            .unwrap_or(0.0);
        Ok(latency)
    }

    async fn queue_paused(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        Ok(conn.exists(paused_key(name)).await?)
    }

    async fn busy_for_queue(&self, name: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let busy: Option<u64> = conn.get(busy_key(name)).await?;
        Ok(busy.unwrap_or(0))
    }

    async fn queue_limit(&self, name: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        Ok(conn.get(limit_key(name)).await?)
    }

    async fn queue_process_limit(&self, name: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        Ok(conn.get(process_limit_key(name)).await?)
    }

    async fn queue_blocked(&self, name: &str) -> StoreResult<Option<bool>> {
        let mut conn = self.conn();
        let blocked: bool = conn.exists(blocked_key(name)).await?;
        Ok(Some(blocked))
    }

    async fn pause_queue(&self, name: &str) -> StoreResult<Ack> {
        let mut conn = self.conn();
        let code: i64 = conn.set_nx(paused_key(name), 1).await?;
        Ok(Ack(code))
    }

    async fn resume_queue(&self, name: &str) -> StoreResult<Ack> {
        let mut conn = self.conn();
        let code: i64 = conn.del(paused_key(name)).await?;
        Ok(Ack(code))
    }

    async fn set_queue_limit(&self, name: &str, limit: u64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.set(limit_key(name), limit).await?;
        Ok(())
    }

    async fn remove_queue_limit(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.del(limit_key(name)).await?;
        Ok(())
    }

    async fn set_queue_process_limit(&self, name: &str, limit: u64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.set(process_limit_key(name), limit).await?;
        Ok(())
    }

    async fn remove_queue_process_limit(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.del(process_limit_key(name)).await?;
        Ok(())
    }

    async fn block_queue(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.set(blocked_key(name), 1).await?;
        Ok(())
    }

    async fn unblock_queue(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.del(blocked_key(name)).await?;
        Ok(())
    }

    async fn clear_queue(&self, name: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        // Size-then-delete is not atomic against concurrent enqueues; the
        // count is best effort.
        let size: u64 = conn.llen(queue_key(name)).await?;
        let _: i64 = conn.del(queue_key(name)).await?;
        Ok(size)
    }

    async fn drop_queue(&self, name: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let size: u64 = conn.llen(queue_key(name)).await?;

        let _: () = redis::pipe()
            .del(queue_key(name))
            .ignore()
            .srem(QUEUES_SET, name)
            .ignore()
            .del(paused_key(name))
            .ignore()
            .del(limit_key(name))
            .ignore()
            .del(process_limit_key(name))
            .ignore()
            .del(blocked_key(name))
            .ignore()
            .del(busy_key(name))
            .ignore()
            .del(engine_config_key(name))
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(size)
    }

    async fn queue_jobs(&self, name: &str) -> StoreResult<Vec<JobRecord>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.lrange(queue_key(name), 0, -1).await?;
        Ok(members.iter().filter_map(|raw| parse_member(raw)).collect())
    }

    async fn delete_queued_job(&self, name: &str, jid: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.lrange(queue_key(name), 0, -1).await?;

        for raw in members {
            if parse_member(&raw).is_some_and(|job| job.jid == jid) {
                let removed: i64 = conn.lrem(queue_key(name), 1, raw).await?;
                return Ok(removed > 0);
            }
        }
        Ok(false)
    }

    async fn set_size(&self, set: JobSet) -> StoreResult<u64> {
        let mut conn = self.conn();
        Ok(conn.zcard(set.key()).await?)
    }

    async fn set_jobs(&self, set: JobSet) -> StoreResult<Vec<JobRecord>> {
        let mut conn = self.conn();
        let members: Vec<(String, f64)> = conn.zrange_withscores(set.key(), 0, -1).await?;
        Ok(members
            .into_iter()
            .filter_map(|(raw, score)| {
                parse_member(&raw).map(|mut job| {
                    hydrate_score(set, score, &mut job);
                    job
                })
            })
            .collect())
    }

    async fn find_in_set(&self, set: JobSet, jid: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self.find_raw(set, jid).await?.map(|(_, _, job)| job))
    }

    async fn remove_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool> {
        let Some((raw, _, _)) = self.find_raw(set, jid).await? else {
            return Ok(false);
        };
        let mut conn = self.conn();
        let removed: i64 = conn.zrem(set.key(), raw).await?;
        Ok(removed > 0)
    }

    async fn clear_set(&self, set: JobSet) -> StoreResult<u64> {
        let mut conn = self.conn();
        let size: u64 = conn.zcard(set.key()).await?;
        let _: i64 = conn.del(set.key()).await?;
        Ok(size)
    }

    async fn enqueue_from_set(&self, set: JobSet, jid: &str) -> StoreResult<bool> {
        let Some((raw, _, mut job)) = self.find_raw(set, jid).await? else {
            return Ok(false);
        };

        let mut conn = self.conn();
        let removed: i64 = conn.zrem(set.key(), raw).await?;
        if removed == 0 {
            // Raced with another client; the job is no longer ours to move.
            return Ok(false);
        }

        job.at = None;
        job.retry_at = None;
        job.enqueued_at = Some(now_epoch());
        self.push_to_queue(&job).await?;
        Ok(true)
    }

    async fn kill_retry_job(&self, jid: &str) -> StoreResult<bool> {
        let Some((raw, _, mut job)) = self.find_raw(JobSet::Retry, jid).await? else {
            return Ok(false);
        };

        let mut conn = self.conn();
        let removed: i64 = conn.zrem(JobSet::Retry.key(), raw).await?;
        if removed == 0 {
            return Ok(false);
        }

        let died_at = now_epoch();
        job.retry_at = None;
        job.failed_at = Some(died_at);
        let payload = serde_json::to_string(&job)?;
        let _: i64 = conn.zadd(JobSet::Dead.key(), payload, died_at).await?;
        Ok(true)
    }

    async fn resurrect_dead_job(&self, jid: &str) -> StoreResult<bool> {
        let Some((raw, _, mut job)) = self.find_raw(JobSet::Dead, jid).await? else {
            return Ok(false);
        };

        let mut conn = self.conn();
        let removed: i64 = conn.zrem(JobSet::Dead.key(), raw).await?;
        if removed == 0 {
            return Ok(false);
        }

        let due_at = now_epoch();
        job.retry_at = Some(due_at);
        let payload = serde_json::to_string(&job)?;
        let _: i64 = conn.zadd(JobSet::Retry.key(), payload, due_at).await?;
        Ok(true)
    }

    async fn processed_total(&self) -> StoreResult<u64> {
        let mut conn = self.conn();
        let count: Option<u64> = conn.get(STAT_PROCESSED_KEY).await?;
        Ok(count.unwrap_or(0))
    }

    async fn failed_total(&self) -> StoreResult<u64> {
        let mut conn = self.conn();
        let count: Option<u64> = conn.get(STAT_FAILED_KEY).await?;
        Ok(count.unwrap_or(0))
    }

    async fn busy_workers(&self) -> StoreResult<u64> {
        self.sum_process_field("busy").await
    }

    async fn process_count(&self) -> StoreResult<u64> {
        let mut conn = self.conn();
        Ok(conn.scard(PROCESSES_SET).await?)
    }

    async fn worker_count(&self) -> StoreResult<u64> {
        self.sum_process_field("concurrency").await
    }

    async fn cache_queue_status(
        &self,
        name: &str,
        status: &str,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let mut conn = self.conn();
        let key = format!("{STATUS_CACHE_PREFIX}:{name}");
        let updated_at = Utc::now().timestamp().to_string();
        let _: () = conn
            .hset_multiple(&key, &[("status", status), ("updated_at", &updated_at)])
            .await?;
        let _: i64 = conn.expire(&key, ttl_secs as i64).await?;
        Ok(())
    }
}
