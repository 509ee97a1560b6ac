// src/routes/manager_route.rs

//! HTTP surface: thin actix-web handlers over the management services, all
//! speaking the shared `{success, message?, data?, timestamp}` envelope.

use std::convert::Infallible;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{web, HttpResponse, ResponseError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, StoreError};
use crate::registry::QueueRegistry;
use crate::services::jobset_service::JobSetService;
use crate::services::live_service::{sse_frame, LiveFeed};
use crate::services::metrics_service::MetricsService;
use crate::services::queue_service::{BulkOutcome, QueueOp, QueueService};
use crate::store::{JobSet, QueueBackend};
use crate::utils::constants::{DEFAULT_QUEUE_PAGE_SIZE, MAX_PER_PAGE};
use crate::utils::pagination::PageQuery;
use crate::utils::response::ApiResponse;

/// Everything the handlers need, wired once at startup from a configuration
/// value and a backend handle.
pub struct ManagerContext {
    pub config: Arc<ManagerConfig>,
    pub queues: QueueService,
    pub job_sets: JobSetService,
    pub metrics: MetricsService,
    shutdown: Arc<Notify>,
}

impl ManagerContext {
    pub fn new(config: ManagerConfig, backend: Arc<dyn QueueBackend>) -> Self {
        let config = Arc::new(config);
        let registry = QueueRegistry::new(backend.clone());

        ManagerContext {
            queues: QueueService::new(backend.clone(), registry.clone(), config.clone()),
            job_sets: JobSetService::new(backend.clone(), config.clone()),
            metrics: MetricsService::new(backend, registry, config.clone()),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Ends every open live stream; called on server shutdown.
    pub fn close_live_streams(&self) {
        self.shutdown.notify_waiters();
    }
}

impl ResponseError for ManagerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ManagerError::InvalidQueue(_) | ManagerError::JobNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ManagerError::InvalidJobId
            | ManagerError::InvalidLimit
            | ManagerError::Config(_) => StatusCode::BAD_REQUEST,
            ManagerError::CriticalQueueProtected { .. }
            | ManagerError::Unacknowledged { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ManagerError::Backend(_) | ManagerError::StreamDisconnected => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ManagerError::Backend(err) = self {
            error!(%err, "Backing store call failed");
        }
        HttpResponse::build(self.status_code()).json(ApiResponse::error(self.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct LimitBody {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JobIdBody {
    job_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterBody {
    filter: Option<String>,
}

impl FilterBody {
    fn filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.trim().is_empty())
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ManagerError> {
    serde_json::to_value(value).map_err(|err| ManagerError::Backend(StoreError::Payload(err)))
}

fn ok(response: ApiResponse) -> HttpResponse {
    HttpResponse::Ok().json(response)
}

fn ok_no_cache(response: ApiResponse) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .insert_header(("Pragma", "no-cache"))
        .insert_header(("Expires", "0"))
        .json(response)
}

fn unknown_set(segment: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::error(format!("Unknown job set: {segment}")))
}

// ========================================
// Metrics and live updates
// ========================================

async fn metrics(ctx: web::Data<ManagerContext>) -> Result<HttpResponse, ManagerError> {
    let snapshot = ctx.metrics.compute().await?;
    Ok(ok_no_cache(ApiResponse::ok(to_value(&snapshot)?)))
}

async fn summary(ctx: web::Data<ManagerContext>) -> Result<HttpResponse, ManagerError> {
    let summary = ctx.metrics.summary().await?;
    Ok(ok_no_cache(ApiResponse::ok(to_value(&summary)?)))
}

async fn live(ctx: web::Data<ManagerContext>) -> HttpResponse {
    let feed = LiveFeed::new(
        ctx.metrics.clone(),
        ctx.config.refresh_interval(),
        ctx.shutdown.clone(),
    );
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        match feed.run(tx).await {
            Ok(()) => info!("Live stream closed"),
            Err(ManagerError::StreamDisconnected) => {
                info!("Client disconnected from live stream");
            }
            Err(err) => error!(%err, "Live stream error"),
        }
    });

    let body = ReceiverStream::new(rx)
        .map(|event| Ok::<Bytes, Infallible>(Bytes::from(sse_frame(&event))));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

// ========================================
// Bulk queue operations
// ========================================

fn bulk_message(verb: &str, done: &str, outcome: &BulkOutcome) -> String {
    let mut message = format!(
        "Bulk {verb} completed. {done}: {}, Skipped: {}",
        outcome.succeeded, outcome.skipped
    );
    if !outcome.failed.is_empty() {
        message.push_str(&format!(", Failed: {}", outcome.failed.join(", ")));
    }
    message
}

async fn pause_all(ctx: web::Data<ManagerContext>) -> Result<HttpResponse, ManagerError> {
    let outcome = ctx.queues.bulk_pause().await?;
    let data = json!({
        "paused": outcome.succeeded,
        "skipped": outcome.skipped,
        "failed": outcome.failed,
    });
    Ok(ok(ApiResponse::ok_message(
        bulk_message("pause", "Paused", &outcome),
        Some(data),
    )))
}

async fn resume_all(ctx: web::Data<ManagerContext>) -> Result<HttpResponse, ManagerError> {
    let outcome = ctx.queues.bulk_resume().await?;
    let data = json!({
        "resumed": outcome.succeeded,
        "skipped": outcome.skipped,
        "failed": outcome.failed,
    });
    Ok(ok(ApiResponse::ok_message(
        bulk_message("resume", "Resumed", &outcome),
        Some(data),
    )))
}

// ========================================
// Per-queue operations
// ========================================

async fn pause_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    let name = path.into_inner();
    ctx.queues.pause(&name).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{name}' paused successfully"),
        None,
    )))
}

async fn resume_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    let name = path.into_inner();
    ctx.queues.resume(&name).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{name}' resumed successfully"),
        None,
    )))
}

async fn queue_status(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    let status = ctx.queues.status(&path).await?;
    Ok(ok(ApiResponse::ok(to_value(&status)?)))
}

async fn queue_jobs(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ManagerError> {
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_QUEUE_PAGE_SIZE)
        .clamp(1, MAX_PER_PAGE);
    let page = ctx.queues.jobs(&path, query.page(), per_page).await?;
    Ok(ok(ApiResponse::ok_message(
        "Queue jobs retrieved successfully",
        Some(to_value(&page)?),
    )))
}

async fn delete_job(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    body: web::Json<JobIdBody>,
) -> Result<HttpResponse, ManagerError> {
    let job_id = body
        .job_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ManagerError::InvalidJobId)?;

    ctx.queues.delete_job(&path, job_id).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Job {job_id} deleted successfully"),
        None,
    )))
}

async fn set_limit(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    body: web::Json<LimitBody>,
) -> Result<HttpResponse, ManagerError> {
    let limit = body.limit.ok_or(ManagerError::InvalidLimit)?;
    ctx.queues.apply(&path, QueueOp::SetLimit(limit)).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' limit set to {limit}", path.as_str()),
        None,
    )))
}

async fn remove_limit(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.queues.apply(&path, QueueOp::RemoveLimit).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' limit removed", path.as_str()),
        None,
    )))
}

async fn set_process_limit(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    body: web::Json<LimitBody>,
) -> Result<HttpResponse, ManagerError> {
    let limit = body.limit.ok_or(ManagerError::InvalidLimit)?;
    ctx.queues
        .apply(&path, QueueOp::SetProcessLimit(limit))
        .await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' process limit set to {limit}", path.as_str()),
        None,
    )))
}

async fn remove_process_limit(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.queues.apply(&path, QueueOp::RemoveProcessLimit).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' process limit removed", path.as_str()),
        None,
    )))
}

async fn block_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.queues.apply(&path, QueueOp::Block).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' blocked successfully", path.as_str()),
        None,
    )))
}

async fn unblock_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.queues.apply(&path, QueueOp::Unblock).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{}' unblocked successfully", path.as_str()),
        None,
    )))
}

async fn clear_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    let name = path.into_inner();
    let cleared = ctx.queues.clear(&name).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{name}' cleared successfully"),
        Some(json!({ "jobs_cleared": cleared })),
    )))
}

async fn delete_queue(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    let name = path.into_inner();
    let cleared = ctx.queues.delete(&name).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("Queue '{name}' deleted successfully"),
        Some(json!({ "jobs_cleared": cleared })),
    )))
}

// ========================================
// Job sets
// ========================================

async fn list_set(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ManagerError> {
    let Some(set) = JobSet::from_path(&path) else {
        return Ok(unknown_set(&path));
    };

    let page = ctx.job_sets.list(set, &query).await?;
    Ok(ok(ApiResponse::ok_message(
        format!("{} jobs retrieved successfully", set.label()),
        Some(to_value(&page)?),
    )))
}

async fn delete_set_job(
    ctx: web::Data<ManagerContext>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ManagerError> {
    let (segment, id) = path.into_inner();
    let Some(set) = JobSet::from_path(&segment) else {
        return Ok(unknown_set(&segment));
    };

    ctx.job_sets.delete(set, &id).await?;
    let message = match set {
        JobSet::Scheduled => "Scheduled job deleted successfully",
        JobSet::Retry => "Retry job deleted successfully",
        JobSet::Dead => "Dead job deleted permanently",
    };
    Ok(ok(ApiResponse::ok_message(message, None)))
}

async fn enqueue_scheduled(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.job_sets.enqueue_now(&path).await?;
    Ok(ok(ApiResponse::ok_message(
        "Scheduled job enqueued successfully",
        None,
    )))
}

async fn retry_job(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.job_sets.retry_now(&path).await?;
    Ok(ok(ApiResponse::ok_message("Job retried successfully", None)))
}

async fn kill_job(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.job_sets.kill(&path).await?;
    Ok(ok(ApiResponse::ok_message(
        "Job moved to dead queue successfully",
        None,
    )))
}

async fn resurrect_job(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ManagerError> {
    ctx.job_sets.resurrect(&path).await?;
    Ok(ok(ApiResponse::ok_message(
        "Dead job resurrected successfully",
        None,
    )))
}

async fn clear_set(
    ctx: web::Data<ManagerContext>,
    path: web::Path<String>,
    body: Option<web::Json<FilterBody>>,
) -> Result<HttpResponse, ManagerError> {
    let Some(set) = JobSet::from_path(&path) else {
        return Ok(unknown_set(&path));
    };

    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let cleared = ctx.job_sets.clear(set, body.filter()).await?;

    let label = set.label().to_lowercase();
    let message = match body.filter() {
        Some(filter) => format!("Cleared {cleared} {label} jobs matching '{filter}'"),
        None => format!("Cleared all {cleared} {label} jobs"),
    };
    Ok(ok(ApiResponse::ok_message(
        message,
        Some(json!({ "jobs_cleared": cleared })),
    )))
}

async fn retry_all(
    ctx: web::Data<ManagerContext>,
    body: Option<web::Json<FilterBody>>,
) -> Result<HttpResponse, ManagerError> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let retried = ctx.job_sets.retry_all(body.filter()).await?;

    let message = match body.filter() {
        Some(filter) => format!("Retried {retried} jobs matching '{filter}'"),
        None => format!("Retried all {retried} jobs"),
    };
    Ok(ok(ApiResponse::ok_message(
        message,
        Some(json!({ "jobs_retried": retried })),
    )))
}

async fn resurrect_all(
    ctx: web::Data<ManagerContext>,
    body: Option<web::Json<FilterBody>>,
) -> Result<HttpResponse, ManagerError> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let resurrected = ctx.job_sets.resurrect_all(body.filter()).await?;

    let message = match body.filter() {
        Some(filter) => format!("Resurrected {resurrected} dead jobs matching '{filter}'"),
        None => format!("Resurrected all {resurrected} dead jobs"),
    };
    Ok(ok(ApiResponse::ok_message(
        message,
        Some(json!({ "jobs_resurrected": resurrected })),
    )))
}

/// Registers the full management surface; mount inside a scope for a custom
/// base path.
pub fn manager_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics))
        .route("/live", web::get().to(live))
        .route("/queues/pause_all", web::post().to(pause_all))
        .route("/queues/resume_all", web::post().to(resume_all))
        .route("/queues/summary", web::get().to(summary))
        .route("/queues/{name}/pause", web::post().to(pause_queue))
        .route("/queues/{name}/resume", web::post().to(resume_queue))
        .route("/queues/{name}/status", web::get().to(queue_status))
        .route("/queues/{name}/jobs", web::get().to(queue_jobs))
        .route("/queues/{name}/delete_job", web::delete().to(delete_job))
        .route("/queues/{name}/set_limit", web::post().to(set_limit))
        .route("/queues/{name}/remove_limit", web::delete().to(remove_limit))
        .route(
            "/queues/{name}/set_process_limit",
            web::post().to(set_process_limit),
        )
        .route(
            "/queues/{name}/remove_process_limit",
            web::delete().to(remove_process_limit),
        )
        .route("/queues/{name}/block", web::post().to(block_queue))
        .route("/queues/{name}/unblock", web::post().to(unblock_queue))
        .route("/queues/{name}/clear", web::post().to(clear_queue))
        .route("/queues/{name}", web::delete().to(delete_queue))
        .route("/scheduled/{id}/enqueue", web::post().to(enqueue_scheduled))
        .route("/retries/retry_all", web::post().to(retry_all))
        .route("/retries/{id}/retry", web::post().to(retry_job))
        .route("/retries/{id}/kill", web::post().to(kill_job))
        .route("/dead/resurrect_all", web::post().to(resurrect_all))
        .route("/dead/{id}/resurrect", web::post().to(resurrect_job))
        .route("/{set}/clear", web::post().to(clear_set))
        .route("/{set}", web::get().to(list_set))
        .route("/{set}/{id}", web::delete().to(delete_set_job));
}
