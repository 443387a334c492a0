//! Screenshot trigger scheduling.
//!
//! The scheduler owns three independently-clocked trigger sources (a
//! recurring timer, a debounced window-change trigger, and explicit
//! requests) and funnels them all through idle gating and the two-tier
//! rate limiter before a capture is attempted. Capture itself is a
//! blocking external call bounded by a deadline.

use crate::buffer::EventSink;
use crate::config::ScreenshotConfig;
use crate::probe::types::Rect;
use crate::probe::{DisplayProbe, IdleProbe};
use crate::screenshot::display::{resolve_display, DisplayTarget, ResolvedTarget};
use crate::screenshot::quota::QuotaState;
use crate::stats::AgentStats;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the scheduler's own idle probe is consulted.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline for one capture call.
const CAPTURE_DEADLINE: Duration = Duration::from_secs(10);

/// Why a capture was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotReason {
    TimeInterval,
    WindowChange,
    TrackingStart,
    Resume,
    Manual,
}

impl ScreenshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotReason::TimeInterval => "time_interval",
            ScreenshotReason::WindowChange => "window_change",
            ScreenshotReason::TrackingStart => "tracking_start",
            ScreenshotReason::Resume => "resume",
            ScreenshotReason::Manual => "manual",
        }
    }

    /// Reasons that bypass idle gating.
    pub fn allowed_while_idle(&self) -> bool {
        matches!(
            self,
            ScreenshotReason::Manual | ScreenshotReason::TrackingStart | ScreenshotReason::Resume
        )
    }
}

/// A realized capture, ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub filename: String,
    pub reason: ScreenshotReason,
}

/// Pixels handed back by the capture provider.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Errors a capture provider can report.
#[derive(Debug)]
pub enum CaptureError {
    /// The OS denied screen capture
    PermissionDenied,
    /// The provider returned no pixels
    EmptyFrame,
    /// The provider detected an all-black frame
    BlackFrame,
    /// Anything else
    Failed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "screen capture permission denied"),
            CaptureError::EmptyFrame => write!(f, "capture returned an empty frame"),
            CaptureError::BlackFrame => write!(f, "capture returned a black frame"),
            CaptureError::Failed(msg) => write!(f, "capture failed: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Pixel capture for a resolved display target.
///
/// Implementations may block; the scheduler enforces the deadline.
pub trait CaptureProvider: Send + Sync {
    fn capture(&self, reason: ScreenshotReason, target: ResolvedTarget)
        -> Result<RawImage, CaptureError>;
}

/// A capture provider that always fails.
///
/// Used when no platform capture backend has been registered; every
/// attempt is logged and skipped without touching quota state.
pub struct NoopCaptureProvider;

impl CaptureProvider for NoopCaptureProvider {
    fn capture(
        &self,
        _reason: ScreenshotReason,
        _target: ResolvedTarget,
    ) -> Result<RawImage, CaptureError> {
        Err(CaptureError::Failed(
            "no capture backend registered".to_string(),
        ))
    }
}

struct SchedulerState {
    is_idle: bool,
    quota: QuotaState,
    /// Bounds of the most recently focused window, for `active` targeting
    active_bounds: Option<Rect>,
    /// Pending debounce slot; re-arming cancels the previous one
    debounce: Option<CancellationToken>,
    /// Recurring timer task; cancelled while idle
    recurring: Option<CancellationToken>,
}

struct SchedulerInner {
    config: ScreenshotConfig,
    provider: Arc<dyn CaptureProvider>,
    display_probe: Arc<dyn DisplayProbe>,
    idle_probe: Arc<dyn IdleProbe>,
    sink: EventSink,
    stats: Arc<AgentStats>,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    state: Mutex<SchedulerState>,
}

/// Coordinates every screenshot trigger source against shared quota state.
#[derive(Clone)]
pub struct ScreenshotScheduler {
    inner: Arc<SchedulerInner>,
}

impl ScreenshotScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScreenshotConfig,
        provider: Arc<dyn CaptureProvider>,
        display_probe: Arc<dyn DisplayProbe>,
        idle_probe: Arc<dyn IdleProbe>,
        sink: EventSink,
        stats: Arc<AgentStats>,
        paused: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        let quota = QuotaState::new(
            Duration::from_millis(config.min_interval_ms),
            Duration::from_millis(config.window_change_interval_ms),
            config.max_per_hour,
        );

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                provider,
                display_probe,
                idle_probe,
                sink,
                stats,
                paused,
                cancel,
                state: Mutex::new(SchedulerState {
                    is_idle: false,
                    quota,
                    active_bounds: None,
                    debounce: None,
                    recurring: None,
                }),
            }),
        }
    }

    /// Arm the recurring timer, start the idle watch, and fire the
    /// tracking-start capture.
    pub fn start(&self) {
        self.inner.arm_recurring();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            SchedulerInner::idle_watch(inner).await;
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.request_capture(ScreenshotReason::TrackingStart).await;
        });
    }

    /// Cancel every timer owned by this scheduler.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        let mut state = self.inner.state.lock().unwrap();
        if let Some(token) = state.debounce.take() {
            token.cancel();
        }
        if let Some(token) = state.recurring.take() {
            token.cancel();
        }
    }

    /// Fan-in for focused-window changes.
    ///
    /// Re-arms the debounce slot so only the last change in a burst
    /// produces a capture request.
    pub fn notify_window_change(&self, bounds: Option<Rect>) {
        let debounce = Duration::from_millis(self.inner.config.window_change_debounce_ms);

        let token = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(b) = bounds {
                state.active_bounds = Some(b);
            }
            if let Some(pending) = state.debounce.take() {
                pending.cancel();
            }
            if state.is_idle {
                return;
            }
            let token = self.inner.cancel.child_token();
            state.debounce = Some(token.clone());
            token
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    inner.request_capture(ScreenshotReason::WindowChange).await;
                }
            }
        });
    }

    /// Request a capture now, subject to idle gating and rate limiting.
    pub async fn request_capture(&self, reason: ScreenshotReason) {
        self.inner.request_capture(reason).await;
    }

    /// Drive an idle transition explicitly (the idle watch does this from
    /// the probe; exposed for callers with their own idle source).
    pub async fn set_idle(&self, idle: bool) {
        self.inner.apply_idle_transition(idle).await;
    }

    /// Whether the scheduler currently considers the user idle.
    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().unwrap().is_idle
    }
}

impl SchedulerInner {
    async fn request_capture(self: &Arc<Self>, reason: ScreenshotReason) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }

        let active_bounds = {
            let mut state = self.state.lock().unwrap();
            if state.is_idle && !reason.allowed_while_idle() {
                self.stats.record_screenshot_rejected();
                debug!(reason = reason.as_str(), "capture rejected while idle");
                return;
            }
            if let Err(denied) = state.quota.check(reason, Instant::now()) {
                self.stats.record_screenshot_rejected();
                debug!(reason = reason.as_str(), %denied, "capture rate-limited");
                return;
            }
            state.active_bounds
        };

        // The lock is released here: the rate limiter is the only guard
        // between overlapping trigger sources, and quota is charged only
        // once the capture has realized.
        let resolved = match self.config.display_target {
            DisplayTarget::All => ResolvedTarget::AllDisplays,
            mode => resolve_display(mode, &self.display_probe.displays(), active_bounds.as_ref()),
        };

        let provider = Arc::clone(&self.provider);
        let attempt = tokio::time::timeout(
            CAPTURE_DEADLINE,
            tokio::task::spawn_blocking(move || provider.capture(reason, resolved)),
        )
        .await;

        match attempt {
            Ok(Ok(Ok(image))) => {
                let filename = format!(
                    "screenshot_{}_{}.png",
                    Utc::now().format("%Y%m%d_%H%M%S%3f"),
                    reason.as_str()
                );
                self.state.lock().unwrap().quota.record_capture(Instant::now());
                self.stats.record_screenshot_captured();
                debug!(
                    filename = %filename,
                    width = image.width,
                    height = image.height,
                    "capture realized"
                );
                self.sink.push_screenshot(ScreenshotRecord { filename, reason });
            }
            Ok(Ok(Err(e))) => {
                self.stats.record_screenshot_failed();
                warn!(reason = reason.as_str(), error = %e, "capture failed");
            }
            Ok(Err(e)) => {
                self.stats.record_screenshot_failed();
                warn!(reason = reason.as_str(), error = %e, "capture worker panicked");
            }
            Err(_) => {
                self.stats.record_screenshot_failed();
                warn!(
                    reason = reason.as_str(),
                    deadline_ms = CAPTURE_DEADLINE.as_millis() as u64,
                    "capture timed out"
                );
            }
        }
    }

    /// (Re-)arm the recurring time-based capture timer.
    fn arm_recurring(self: &Arc<Self>) {
        let interval = Duration::from_millis(self.config.interval_ms);
        if interval.is_zero() {
            return;
        }

        let token = {
            let mut state = self.state.lock().unwrap();
            if let Some(previous) = state.recurring.take() {
                previous.cancel();
            }
            let token = self.cancel.child_token();
            state.recurring = Some(token.clone());
            token
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.request_capture(ScreenshotReason::TimeInterval).await;
                    }
                }
            }
        });
    }

    /// Poll the scheduler's own idle probe and apply transitions.
    async fn idle_watch(inner: Arc<Self>) {
        let threshold = Duration::from_millis(inner.config.idle_threshold_ms);
        let mut ticker = tokio::time::interval(IDLE_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let idle_now = inner
                        .idle_probe
                        .idle_seconds()
                        .map(|secs| Duration::from_secs(secs) >= threshold)
                        .unwrap_or(false);
                    inner.apply_idle_transition(idle_now).await;
                }
            }
        }
    }

    async fn apply_idle_transition(self: &Arc<Self>, idle_now: bool) {
        {
            let mut state = self.state.lock().unwrap();
            if state.is_idle == idle_now {
                return;
            }
            state.is_idle = idle_now;
            if idle_now {
                // No new triggers while idle.
                if let Some(token) = state.recurring.take() {
                    token.cancel();
                }
                if let Some(token) = state.debounce.take() {
                    token.cancel();
                }
            }
        }

        if idle_now {
            info!("user idle, capture timers cancelled");
        } else {
            info!("user active again, re-arming capture timer");
            self.arm_recurring();
            if self.config.resume_capture_on_active {
                self.request_capture(ScreenshotReason::Resume).await;
            }
        }
    }
}
