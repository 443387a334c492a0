//! Session statistics.
//!
//! Atomic counters for everything the engine does that would otherwise be
//! invisible: suppressed records, rejected captures, and above all silent
//! buffer eviction, which is bounded data loss by design and must be
//! observable somewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct AgentStats {
    activity_records_emitted: AtomicU64,
    screenshots_captured: AtomicU64,
    screenshots_rejected: AtomicU64,
    screenshots_failed: AtomicU64,
    events_buffered: AtomicU64,
    events_evicted: AtomicU64,
    batches_sent: AtomicU64,
    events_delivered: AtomicU64,
    batches_failed: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl AgentStats {
    pub fn new() -> Self {
        Self {
            activity_records_emitted: AtomicU64::new(0),
            screenshots_captured: AtomicU64::new(0),
            screenshots_rejected: AtomicU64::new(0),
            screenshots_failed: AtomicU64::new(0),
            events_buffered: AtomicU64::new(0),
            events_evicted: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create shared stats with persistence, seeding counters from any
    /// previous session found at `path`.
    pub fn shared_with_persistence(path: PathBuf) -> Arc<Self> {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::debug!(error = %e, "no previous stats loaded");
        }

        Arc::new(stats)
    }

    pub fn record_activity_emitted(&self) {
        self.activity_records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_screenshot_captured(&self) {
        self.screenshots_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_screenshot_rejected(&self) {
        self.screenshots_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_screenshot_failed(&self) {
        self.screenshots_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_buffered(&self) {
        self.events_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_evicted(&self) {
        self.events_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self, events: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_delivered
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            activity_records_emitted: self.activity_records_emitted.load(Ordering::Relaxed),
            screenshots_captured: self.screenshots_captured.load(Ordering::Relaxed),
            screenshots_rejected: self.screenshots_rejected.load(Ordering::Relaxed),
            screenshots_failed: self.screenshots_failed.load(Ordering::Relaxed),
            events_buffered: self.events_buffered.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Activity records emitted: {}\n\
             - Screenshots captured: {}\n\
             - Screenshots rejected (idle/rate limit): {}\n\
             - Screenshots failed: {}\n\
             - Events buffered: {}\n\
             - Events evicted (buffer full): {}\n\
             - Batches delivered: {} ({} events)\n\
             - Batches failed and requeued: {}\n\
             - Session duration: {} seconds",
            s.activity_records_emitted,
            s.screenshots_captured,
            s.screenshots_rejected,
            s.screenshots_failed,
            s.events_buffered,
            s.events_evicted,
            s.batches_sent,
            s.events_delivered,
            s.batches_failed,
            s.session_duration_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let path = match &self.persist_path {
            Some(path) => path,
            None => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Seed counters from a previous session's file.
    fn load(&mut self) -> Result<(), std::io::Error> {
        let path = match &self.persist_path {
            Some(path) => path.clone(),
            None => return Ok(()),
        };

        let content = std::fs::read_to_string(path)?;
        let previous: StatsSnapshot = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        *self.activity_records_emitted.get_mut() = previous.activity_records_emitted;
        *self.screenshots_captured.get_mut() = previous.screenshots_captured;
        *self.screenshots_rejected.get_mut() = previous.screenshots_rejected;
        *self.screenshots_failed.get_mut() = previous.screenshots_failed;
        *self.events_buffered.get_mut() = previous.events_buffered;
        *self.events_evicted.get_mut() = previous.events_evicted;
        *self.batches_sent.get_mut() = previous.batches_sent;
        *self.events_delivered.get_mut() = previous.events_delivered;
        *self.batches_failed.get_mut() = previous.batches_failed;

        Ok(())
    }
}

impl Default for AgentStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub activity_records_emitted: u64,
    pub screenshots_captured: u64,
    pub screenshots_rejected: u64,
    pub screenshots_failed: u64,
    pub events_buffered: u64,
    pub events_evicted: u64,
    pub batches_sent: u64,
    pub events_delivered: u64,
    pub batches_failed: u64,
    pub session_start: DateTime<Utc>,
    #[serde(default)]
    pub session_duration_secs: u64,
}
