//! Bounded in-memory event buffering.
//!
//! Records produced anywhere in the engine are wrapped into the collector
//! wire envelope and appended here. The buffer trades completeness for
//! bounded memory: at capacity the oldest event is evicted silently, which
//! is the documented behavior under sustained collector outages.

use crate::activity::ActivityRecord;
use crate::config::CollectorConfig;
use crate::screenshot::scheduler::ScreenshotRecord;
use crate::stats::AgentStats;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Event attribution stamped on every envelope.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub device_id: String,
    pub domain: String,
}

impl From<&CollectorConfig> for Identity {
    fn from(collector: &CollectorConfig) -> Self {
        Self {
            username: collector.username.clone(),
            device_id: collector.device_id.clone(),
            domain: collector.domain.clone(),
        }
    }
}

/// Wire event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WindowActivity,
    /// Present for wire compatibility; no core producer emits it
    Clipboard,
    Screenshot,
}

/// Type-specific event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    WindowActivity(ActivityRecord),
    Screenshot(ScreenshotRecord),
    Other(serde_json::Value),
}

/// The envelope delivered to the collector, stable across the network
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedEvent {
    pub username: String,
    pub device_id: String,
    pub domain: String,
    /// ISO-8601 timestamp
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub data: EventData,
}

impl BufferedEvent {
    /// Wrap an activity record for delivery.
    pub fn window_activity(identity: &Identity, record: ActivityRecord) -> Self {
        Self {
            username: identity.username.clone(),
            device_id: identity.device_id.clone(),
            domain: identity.domain.clone(),
            timestamp: Utc::now().to_rfc3339(),
            event_type: EventType::WindowActivity,
            duration_ms: Some(record.duration_ms),
            reason: None,
            data: EventData::WindowActivity(record),
        }
    }

    /// Wrap a screenshot record for delivery.
    pub fn screenshot(identity: &Identity, record: ScreenshotRecord) -> Self {
        Self {
            username: identity.username.clone(),
            device_id: identity.device_id.clone(),
            domain: identity.domain.clone(),
            timestamp: Utc::now().to_rfc3339(),
            event_type: EventType::Screenshot,
            duration_ms: None,
            reason: Some(record.reason.as_str().to_string()),
            data: EventData::Screenshot(record),
        }
    }
}

/// Append-only bounded FIFO of serialized events.
pub struct EventBuffer {
    batch_size: usize,
    max_size: usize,
    queue: VecDeque<BufferedEvent>,
}

impl EventBuffer {
    pub fn new(batch_size: usize, max_size: usize) -> Self {
        Self {
            batch_size,
            max_size,
            queue: VecDeque::with_capacity(batch_size.min(max_size)),
        }
    }

    /// Append an event, evicting the oldest entry first when at capacity.
    ///
    /// Returns whether the post-add size reached the batch threshold, the
    /// caller's signal to trigger an immediate flush.
    pub fn add(&mut self, event: BufferedEvent) -> bool {
        if self.queue.len() >= self.max_size {
            self.queue.pop_front();
        }
        self.queue.push_back(event);
        self.queue.len() >= self.batch_size
    }

    /// Atomically remove and return all buffered events.
    pub fn drain(&mut self) -> Vec<BufferedEvent> {
        self.queue.drain(..).collect()
    }

    /// Current number of buffered events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the next `add` would evict.
    pub fn at_capacity(&self) -> bool {
        self.queue.len() >= self.max_size
    }
}

/// Shared entry point for every producer that appends to the buffer.
///
/// Wraps records into envelopes, tracks stats, and pokes the dispatcher
/// when a batch is ready.
#[derive(Clone)]
pub struct EventSink {
    identity: Identity,
    buffer: Arc<Mutex<EventBuffer>>,
    flush_notify: Arc<Notify>,
    stats: Arc<AgentStats>,
}

impl EventSink {
    pub fn new(
        identity: Identity,
        buffer: Arc<Mutex<EventBuffer>>,
        flush_notify: Arc<Notify>,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            identity,
            buffer,
            flush_notify,
            stats,
        }
    }

    pub fn push_activity(&self, record: ActivityRecord) {
        self.stats.record_activity_emitted();
        self.push(BufferedEvent::window_activity(&self.identity, record));
    }

    pub fn push_screenshot(&self, record: ScreenshotRecord) {
        self.push(BufferedEvent::screenshot(&self.identity, record));
    }

    fn push(&self, event: BufferedEvent) {
        let batch_ready = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.at_capacity() {
                self.stats.record_event_evicted();
            }
            buffer.add(event)
        };
        self.stats.record_event_buffered();

        if batch_ready {
            self.flush_notify.notify_one();
        }
    }
}
