//! Batch delivery to the collector.
//!
//! The dispatcher drains the event buffer on a fixed period and whenever
//! the buffer signals a full batch. Delivery failures re-enqueue the
//! drained batch through the normal add path, so sustained outages degrade
//! to oldest-event eviction instead of unbounded growth. The wire sees
//! at-least-once delivery with best-effort ordering.

use crate::buffer::{BufferedEvent, EventBuffer};
use crate::config::CollectorConfig;
use crate::stats::AgentStats;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upload error types.
#[derive(Debug)]
pub enum UploadError {
    /// Client construction or configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Config(msg) => write!(f, "upload config error: {msg}"),
            UploadError::Network(msg) => write!(f, "upload network error: {msg}"),
            UploadError::Server { status, message } => {
                write!(f, "collector error ({status}): {message}")
            }
            UploadError::Serialization(msg) => write!(f, "upload serialization error: {msg}"),
        }
    }
}

impl std::error::Error for UploadError {}

/// Network transport to the collector.
///
/// Implementations may block; the dispatcher drives them on a blocking
/// worker.
pub trait UploadClient: Send + Sync {
    fn send_batch(&self, events: &[BufferedEvent]) -> Result<(), UploadError>;
}

/// Batch payload shape expected by the collector events endpoint.
#[derive(Serialize)]
struct EventBatch<'a> {
    events: &'a [BufferedEvent],
}

/// Blocking HTTP client for the collector.
pub struct HttpUploadClient {
    config: CollectorConfig,
    client: reqwest::blocking::Client,
}

impl HttpUploadClient {
    pub fn new(config: CollectorConfig) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| UploadError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the collector.
    pub fn check_health(&self) -> Result<bool, UploadError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

impl UploadClient for HttpUploadClient {
    fn send_batch(&self, events: &[BufferedEvent]) -> Result<(), UploadError> {
        let response = self
            .client
            .post(self.config.events_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Content-Type", "application/json")
            .json(&EventBatch { events })
            .send()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// The batch was delivered
    Sent(usize),
    /// Delivery failed; the batch went back into the buffer
    Requeued(usize),
}

/// Drains the buffer and delivers batches, requeueing on failure.
pub struct Dispatcher {
    buffer: Arc<Mutex<EventBuffer>>,
    client: Arc<dyn UploadClient>,
    stats: Arc<AgentStats>,
}

impl Dispatcher {
    pub fn new(
        buffer: Arc<Mutex<EventBuffer>>,
        client: Arc<dyn UploadClient>,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            buffer,
            client,
            stats,
        }
    }

    /// Drain and deliver one batch. Blocking: call from a blocking worker.
    pub fn flush(&self) -> FlushOutcome {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.drain()
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = batch.len();
        match self.client.send_batch(&batch) {
            Ok(()) => {
                self.stats.record_batch_sent(count);
                debug!(events = count, "batch delivered");
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                self.stats.record_batch_failed();
                warn!(events = count, error = %e, "batch delivery failed, requeueing");
                let mut buffer = self.buffer.lock().unwrap();
                for event in batch {
                    if buffer.at_capacity() {
                        self.stats.record_event_evicted();
                    }
                    buffer.add(event);
                }
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Run the periodic flush loop until cancelled.
    ///
    /// Flushes on the fixed period and whenever the buffer signals a full
    /// batch; one final flush runs on cancellation.
    pub async fn run(
        self: Arc<Self>,
        flush_interval: Duration,
        flush_notify: Arc<Notify>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval is immediate.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = flush_notify.notified() => {}
            }
            self.flush_on_worker().await;
        }

        info!("dispatcher stopping, final flush");
        self.flush_on_worker().await;
    }

    async fn flush_on_worker(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.flush()).await {
            warn!(error = %e, "flush worker panicked");
        }
    }
}
