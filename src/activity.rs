//! Focused-window activity tracking.
//!
//! The state machine consumes one window snapshot per poll tick together
//! with the system idle counter and turns the stream into discrete,
//! duration-bounded activity records. A record always describes the window
//! that was focused *before* the transition that closed it.

use crate::probe::types::{Rect, WindowSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A closed span of focused activity on one window.
///
/// Immutable once emitted. Field names follow the collector wire format
/// for `window_activity.data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub application: String,
    pub title: String,
    /// Span length in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// True when this record closed the span because the user went idle
    #[serde(rename = "isIdle")]
    pub is_idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// What one poll tick produced.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Record closed by this tick, if any
    pub record: Option<ActivityRecord>,
    /// Whether the focused window changed on this tick
    pub window_changed: bool,
}

/// Converts periodic window snapshots and idle signals into activity records.
///
/// States: no window tracked (initial) or tracking one window with an idle
/// flag. All time math runs on the monotonic `now` passed by the caller so
/// the machine is clock-free and testable.
pub struct ActivityStateMachine {
    min_activity_duration: Duration,
    max_idle_time: Duration,
    max_session_chunk: Duration,
    last_window: Option<WindowSnapshot>,
    last_timestamp: Option<Instant>,
    /// Last activity transition; doubles as the idle fallback clock when
    /// the idle probe is unavailable.
    last_transition: Option<Instant>,
    is_idle: bool,
}

impl ActivityStateMachine {
    pub fn new(
        min_activity_duration: Duration,
        max_idle_time: Duration,
        max_session_chunk: Duration,
    ) -> Self {
        Self {
            min_activity_duration,
            max_idle_time,
            max_session_chunk,
            last_window: None,
            last_timestamp: None,
            last_transition: None,
            is_idle: false,
        }
    }

    /// Whether the machine currently considers the user idle.
    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    /// Process one poll tick.
    ///
    /// `idle_seconds` is the probe reading, or `None` when the probe is
    /// unavailable (the machine then falls back to time since its own last
    /// activity transition).
    pub fn observe(
        &mut self,
        snapshot: WindowSnapshot,
        idle_seconds: Option<u64>,
        now: Instant,
    ) -> TickOutcome {
        let is_idle_now = self.compute_idle(idle_seconds, now);

        // First usable window: adopt silently.
        let prev = match self.last_window.clone() {
            Some(prev) => prev,
            None => {
                if !snapshot.is_empty() {
                    self.adopt(snapshot, now);
                }
                return TickOutcome::default();
            }
        };

        // Resume from idle: reset timers without emitting, so idle time is
        // never counted as activity. A window change during idle is adopted
        // silently.
        if self.is_idle && !is_idle_now {
            self.is_idle = false;
            self.last_timestamp = Some(now);
            self.last_transition = Some(now);
            let window_changed = !snapshot.same_window(&prev);
            if window_changed {
                self.last_window = Some(snapshot);
            }
            return TickOutcome {
                record: None,
                window_changed,
            };
        }

        // Steady idle: nothing accumulates until the user comes back.
        if self.is_idle && is_idle_now {
            return TickOutcome::default();
        }

        let window_changed = !snapshot.same_window(&prev);
        let idle_started = is_idle_now && !self.is_idle;
        let duration = now.saturating_duration_since(self.last_timestamp.unwrap_or(now));
        let chunk_elapsed = duration >= self.max_session_chunk;

        if !window_changed && !idle_started && !chunk_elapsed {
            return TickOutcome::default();
        }

        // An empty previous window is unrecordable; so is a span shorter
        // than the minimum.
        let record = if duration >= self.min_activity_duration && !prev.is_empty() {
            Some(ActivityRecord {
                application: prev.application.clone(),
                title: prev.title.clone(),
                duration_ms: duration.as_millis() as u64,
                is_idle: idle_started,
                bounds: prev.bounds,
                path: prev.path.clone(),
            })
        } else {
            None
        };

        self.last_timestamp = Some(now);
        if window_changed {
            self.last_window = Some(snapshot);
            self.last_transition = Some(now);
        }
        if idle_started {
            self.is_idle = true;
        }

        TickOutcome {
            record,
            window_changed,
        }
    }

    /// Close out the current span, e.g. on shutdown.
    ///
    /// Emits a final record subject to the same minimum-duration rule.
    pub fn flush(&mut self, now: Instant) -> Option<ActivityRecord> {
        let prev = self.last_window.take()?;
        let last = self.last_timestamp.take()?;
        self.last_transition = None;

        if self.is_idle || prev.is_empty() {
            return None;
        }

        let duration = now.saturating_duration_since(last);
        if duration < self.min_activity_duration {
            return None;
        }

        Some(ActivityRecord {
            application: prev.application.clone(),
            title: prev.title.clone(),
            duration_ms: duration.as_millis() as u64,
            is_idle: false,
            bounds: prev.bounds,
            path: prev.path,
        })
    }

    fn compute_idle(&self, idle_seconds: Option<u64>, now: Instant) -> bool {
        match idle_seconds {
            Some(secs) => Duration::from_secs(secs) >= self.max_idle_time,
            None => match self.last_transition {
                Some(t) => now.saturating_duration_since(t) >= self.max_idle_time,
                None => false,
            },
        }
    }

    fn adopt(&mut self, snapshot: WindowSnapshot, now: Instant) {
        self.last_window = Some(snapshot);
        self.last_timestamp = Some(now);
        self.last_transition = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(app: &str, title: &str) -> WindowSnapshot {
        WindowSnapshot {
            application: app.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn machine(min_ms: u64, idle_ms: u64, chunk_ms: u64) -> ActivityStateMachine {
        ActivityStateMachine::new(
            Duration::from_millis(min_ms),
            Duration::from_millis(idle_ms),
            Duration::from_millis(chunk_ms),
        )
    }

    #[test]
    fn test_first_window_adopted_silently() {
        let mut m = machine(2_000, 300_000, 300_000);
        let t0 = Instant::now();

        let out = m.observe(window("A", "a"), Some(0), t0);
        assert!(out.record.is_none());
        assert!(!out.window_changed);
    }

    #[test]
    fn test_window_change_emits_record_for_previous_window() {
        let mut m = machine(2_000, 300_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let out = m.observe(
            window("B", "b"),
            Some(0),
            t0 + Duration::from_millis(3_000),
        );

        assert!(out.window_changed);
        let record = out.record.expect("record for window A");
        assert_eq!(record.application, "A");
        assert_eq!(record.duration_ms, 3_000);
        assert!(!record.is_idle);
    }

    #[test]
    fn test_short_spans_are_suppressed() {
        let mut m = machine(2_000, 300_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let out = m.observe(window("B", "b"), Some(0), t0 + Duration::from_millis(500));

        // The change still happens, the record does not.
        assert!(out.window_changed);
        assert!(out.record.is_none());

        // And the next span belongs to B.
        let out = m.observe(
            window("C", "c"),
            Some(0),
            t0 + Duration::from_millis(3_500),
        );
        assert_eq!(out.record.unwrap().application, "B");
    }

    #[test]
    fn test_no_record_below_minimum_ever() {
        let mut m = machine(2_000, 300_000, 300_000);
        let t0 = Instant::now();

        let apps = ["A", "B", "C", "D", "E"];
        let mut t = t0;
        for app in apps {
            let out = m.observe(window(app, "t"), Some(0), t);
            if let Some(record) = out.record {
                assert!(record.duration_ms >= 2_000);
            }
            t += Duration::from_millis(700);
        }
    }

    #[test]
    fn test_idle_transition_emits_exactly_one_record() {
        let mut m = machine(1_000, 60_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let out = m.observe(window("A", "a"), Some(90), t0 + Duration::from_millis(10_000));

        let record = out.record.expect("idle transition record");
        assert!(record.is_idle);
        assert_eq!(record.application, "A");
        assert!(m.is_idle());

        // Steady idle produces nothing further.
        let out = m.observe(window("A", "a"), Some(120), t0 + Duration::from_millis(20_000));
        assert!(out.record.is_none());
        let out = m.observe(window("B", "b"), Some(150), t0 + Duration::from_millis(30_000));
        assert!(out.record.is_none());
    }

    #[test]
    fn test_resume_resets_without_emitting() {
        let mut m = machine(1_000, 60_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        m.observe(window("A", "a"), Some(90), t0 + Duration::from_millis(10_000));
        assert!(m.is_idle());

        // Active again: no record, timers reset.
        let resume_at = t0 + Duration::from_millis(600_000);
        let out = m.observe(window("A", "a"), Some(0), resume_at);
        assert!(out.record.is_none());
        assert!(!m.is_idle());

        // The idle gap is not counted into the next span.
        let out = m.observe(
            window("B", "b"),
            Some(0),
            resume_at + Duration::from_millis(5_000),
        );
        assert_eq!(out.record.unwrap().duration_ms, 5_000);
    }

    #[test]
    fn test_resume_with_changed_window_adopts_silently() {
        let mut m = machine(1_000, 60_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        m.observe(window("A", "a"), Some(90), t0 + Duration::from_millis(10_000));

        let resume_at = t0 + Duration::from_millis(600_000);
        let out = m.observe(window("B", "b"), Some(0), resume_at);
        assert!(out.record.is_none());
        assert!(out.window_changed);

        // Next span is attributed to B.
        let out = m.observe(
            window("C", "c"),
            Some(0),
            resume_at + Duration::from_millis(4_000),
        );
        assert_eq!(out.record.unwrap().application, "B");
    }

    #[test]
    fn test_session_chunk_split() {
        let mut m = machine(1_000, 600_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let out = m.observe(window("A", "a"), Some(0), t0 + Duration::from_millis(301_000));

        let record = out.record.expect("chunk split record");
        assert_eq!(record.application, "A");
        assert_eq!(record.duration_ms, 301_000);
        assert!(!record.is_idle);
        assert!(!out.window_changed);

        // Timer reset: the next chunk counts from the split.
        let out = m.observe(window("A", "a"), Some(0), t0 + Duration::from_millis(400_000));
        assert!(out.record.is_none());
    }

    #[test]
    fn test_idle_takes_priority_over_chunk_split() {
        let mut m = machine(1_000, 60_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        // Both the chunk boundary and the idle threshold are crossed.
        let out = m.observe(window("A", "a"), Some(120), t0 + Duration::from_millis(310_000));

        let record = out.record.expect("record");
        assert!(record.is_idle);
        assert!(m.is_idle());
    }

    #[test]
    fn test_idle_fallback_clock_when_probe_unavailable() {
        let mut m = machine(1_000, 60_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        // Probe gone; same window for longer than the idle threshold.
        let out = m.observe(window("A", "a"), None, t0 + Duration::from_millis(90_000));

        let record = out.record.expect("fallback idle record");
        assert!(record.is_idle);
        assert!(m.is_idle());
    }

    #[test]
    fn test_empty_snapshot_closes_span_without_tracking_garbage() {
        let mut m = machine(1_000, 300_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let out = m.observe(
            WindowSnapshot::empty(),
            Some(0),
            t0 + Duration::from_millis(5_000),
        );
        assert_eq!(out.record.unwrap().application, "A");

        // No record is ever attributed to the empty window.
        let out = m.observe(
            window("B", "b"),
            Some(0),
            t0 + Duration::from_millis(10_000),
        );
        assert!(out.record.is_none());
    }

    #[test]
    fn test_flush_emits_final_record() {
        let mut m = machine(1_000, 300_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        let record = m.flush(t0 + Duration::from_millis(4_000)).expect("final record");
        assert_eq!(record.application, "A");
        assert_eq!(record.duration_ms, 4_000);

        // Flushing twice yields nothing.
        assert!(m.flush(t0 + Duration::from_millis(5_000)).is_none());
    }

    #[test]
    fn test_flush_respects_minimum_duration() {
        let mut m = machine(2_000, 300_000, 300_000);
        let t0 = Instant::now();

        m.observe(window("A", "a"), Some(0), t0);
        assert!(m.flush(t0 + Duration::from_millis(500)).is_none());
    }

    #[test]
    fn test_wire_serialization_field_names() {
        let record = ActivityRecord {
            application: "A".to_string(),
            title: "a".to_string(),
            duration_ms: 3_000,
            is_idle: false,
            bounds: None,
            path: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"duration\":3000"));
        assert!(json.contains("\"isIdle\":false"));
        assert!(!json.contains("bounds"));
    }
}
