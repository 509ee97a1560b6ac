// src/services/live_service.rs

//! The live update feed: a cancellable polling loop pushing metrics
//! snapshots at the configured refresh interval.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::error;

use crate::error::ManagerError;
use crate::services::metrics_service::{MetricsService, MetricsSnapshot};

/// One server-sent event. A failed poll becomes an `Error` event; the feed
/// keeps streaming afterwards.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Metrics(Box<MetricsSnapshot>),
    Error(String),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Metrics(_) => "metrics",
            LiveEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            LiveEvent::Metrics(snapshot) => {
                serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string())
            }
            LiveEvent::Error(message) => json!({ "message": message }).to_string(),
        }
    }
}

/// Wire framing for one SSE event.
pub fn sse_frame(event: &LiveEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.name(), event.payload())
}

pub struct LiveFeed {
    metrics: MetricsService,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl LiveFeed {
    pub fn new(metrics: MetricsService, interval: Duration, shutdown: Arc<Notify>) -> Self {
        LiveFeed {
            metrics,
            interval,
            shutdown,
        }
    }

    /// Push one snapshot immediately, then poll on the interval until the
    /// receiver goes away or shutdown is signalled. Receiver drop is the
    /// client disconnecting and interrupts the sleep rather than waiting it
    /// out; it surfaces as `StreamDisconnected` so the caller can log a
    /// clean exit. A shutdown notification ends the feed with `Ok`.
    pub async fn run(&self, tx: Sender<LiveEvent>) -> Result<(), ManagerError> {
        // Register for shutdown before the first push so a close signal
        // arriving mid-iteration is never lost.
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if tx.send(self.poll().await).await.is_err() {
            return Err(ManagerError::StreamDisconnected);
        }

        loop {
            tokio::select! {
                _ = tx.closed() => return Err(ManagerError::StreamDisconnected),
                _ = &mut shutdown => return Ok(()),
                _ = sleep(self.interval) => {}
            }

            if tx.send(self.poll().await).await.is_err() {
                return Err(ManagerError::StreamDisconnected);
            }
        }
    }

    async fn poll(&self) -> LiveEvent {
        match self.metrics.compute().await {
            Ok(snapshot) => LiveEvent::Metrics(Box::new(snapshot)),
            Err(err) => {
                error!(%err, "Live stream metrics poll failed");
                LiveEvent::Error("Stream error occurred".to_string())
            }
        }
    }
}
