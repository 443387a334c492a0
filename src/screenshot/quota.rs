//! Two-tier capture rate limiting.
//!
//! Tier one is minimum spacing between consecutive captures (with a
//! shorter allowance for window-change captures); tier two is a rolling
//! hourly cap enforced by trimming a timestamp list. Only a realized
//! capture consumes budget; denied or failed attempts never do.

use crate::screenshot::scheduler::ScreenshotReason;
use std::time::Duration;
use tokio::time::Instant;

/// The trailing window for the hourly cap.
pub const HOURLY_WINDOW: Duration = Duration::from_millis(3_600_000);

/// Why a capture request was denied by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenied {
    /// Minimum spacing since the last capture has not elapsed
    TooSoon { wait_ms: u64 },
    /// The rolling hourly cap is exhausted
    HourlyCapReached { cap: usize },
}

impl std::fmt::Display for QuotaDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaDenied::TooSoon { wait_ms } => {
                write!(f, "too soon, {wait_ms}ms until next capture")
            }
            QuotaDenied::HourlyCapReached { cap } => {
                write!(f, "hourly cap of {cap} captures reached")
            }
        }
    }
}

/// Capture rate-limit bookkeeping.
///
/// Mutated only by the scheduler. All methods take an explicit `now` so
/// the limiter can be driven by a synthetic clock in tests.
pub struct QuotaState {
    min_interval: Duration,
    window_change_interval: Duration,
    max_per_hour: usize,
    last_capture_at: Option<Instant>,
    hourly: Vec<Instant>,
}

impl QuotaState {
    pub fn new(
        min_interval: Duration,
        window_change_interval: Duration,
        max_per_hour: usize,
    ) -> Self {
        Self {
            min_interval,
            window_change_interval,
            max_per_hour,
            last_capture_at: None,
            hourly: Vec::new(),
        }
    }

    /// Check whether a capture for `reason` may proceed at `now`.
    ///
    /// Trims the hourly list as a side effect but never records a capture;
    /// call [`QuotaState::record_capture`] once the capture has actually
    /// succeeded.
    pub fn check(&mut self, reason: ScreenshotReason, now: Instant) -> Result<(), QuotaDenied> {
        let spacing = if reason == ScreenshotReason::WindowChange {
            self.window_change_interval
        } else {
            self.min_interval
        };

        if let Some(last) = self.last_capture_at {
            let since = now.saturating_duration_since(last);
            if since < spacing {
                let wait_ms = (spacing - since).as_millis() as u64;
                return Err(QuotaDenied::TooSoon { wait_ms });
            }
        }

        self.hourly
            .retain(|t| now.saturating_duration_since(*t) < HOURLY_WINDOW);
        if self.hourly.len() >= self.max_per_hour {
            return Err(QuotaDenied::HourlyCapReached {
                cap: self.max_per_hour,
            });
        }

        Ok(())
    }

    /// Record a realized capture at `now`.
    pub fn record_capture(&mut self, now: Instant) {
        self.last_capture_at = Some(now);
        self.hourly.push(now);
    }

    /// Captures counted in the current rolling hour.
    pub fn hourly_count(&self) -> usize {
        self.hourly.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(min_ms: u64, wc_ms: u64, cap: usize) -> QuotaState {
        QuotaState::new(
            Duration::from_millis(min_ms),
            Duration::from_millis(wc_ms),
            cap,
        )
    }

    #[test]
    fn test_first_capture_always_passes_spacing() {
        let mut q = quota(60_000, 30_000, 10);
        assert!(q.check(ScreenshotReason::Manual, Instant::now()).is_ok());
    }

    #[test]
    fn test_minimum_spacing() {
        let mut q = quota(60_000, 30_000, 100);
        let t0 = Instant::now();

        q.record_capture(t0);
        assert!(matches!(
            q.check(ScreenshotReason::TimeInterval, t0 + Duration::from_millis(59_999)),
            Err(QuotaDenied::TooSoon { .. })
        ));
        assert!(q
            .check(ScreenshotReason::TimeInterval, t0 + Duration::from_millis(60_000))
            .is_ok());
    }

    #[test]
    fn test_window_change_uses_shorter_spacing() {
        let mut q = quota(60_000, 30_000, 100);
        let t0 = Instant::now();

        q.record_capture(t0);
        let later = t0 + Duration::from_millis(30_000);
        assert!(q.check(ScreenshotReason::WindowChange, later).is_ok());
        assert!(q.check(ScreenshotReason::TimeInterval, later).is_err());
    }

    #[test]
    fn test_rolling_hourly_cap_under_flood() {
        let cap = 20;
        let mut q = quota(0, 0, cap);
        let t0 = Instant::now();

        // Flood far more requests than the cap allows within one hour.
        let mut realized = 0;
        for n in 0..500u64 {
            let now = t0 + Duration::from_millis(n * 1_000);
            if q.check(ScreenshotReason::Manual, now).is_ok() {
                q.record_capture(now);
                realized += 1;
            }
        }
        assert_eq!(realized, cap);
        assert_eq!(q.hourly_count(), cap);
    }

    #[test]
    fn test_cap_window_rolls() {
        let cap = 5;
        let mut q = quota(0, 0, cap);
        let t0 = Instant::now();

        for n in 0..cap as u64 {
            let now = t0 + Duration::from_millis(n);
            assert!(q.check(ScreenshotReason::Manual, now).is_ok());
            q.record_capture(now);
        }
        assert!(q
            .check(ScreenshotReason::Manual, t0 + Duration::from_millis(10))
            .is_err());

        // One hour after the first capture the oldest entries age out.
        let later = t0 + HOURLY_WINDOW + Duration::from_millis(10);
        assert!(q.check(ScreenshotReason::Manual, later).is_ok());
        assert!(q.hourly_count() < cap);
    }

    #[test]
    fn test_denied_attempts_consume_nothing() {
        let mut q = quota(60_000, 30_000, 10);
        let t0 = Instant::now();

        q.record_capture(t0);
        for _ in 0..50 {
            let _ = q.check(ScreenshotReason::TimeInterval, t0 + Duration::from_millis(100));
        }
        assert_eq!(q.hourly_count(), 1);
        // Spacing still measured from the realized capture.
        assert!(q
            .check(ScreenshotReason::TimeInterval, t0 + Duration::from_millis(60_000))
            .is_ok());
    }
}
