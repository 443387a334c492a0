//! Screenshot capture scheduling.
//!
//! This module contains:
//! - Display target resolution across multi-display layouts
//! - Two-tier capture rate limiting (spacing + rolling hourly cap)
//! - The trigger scheduler coordinating timers, debounce, and idle gating

pub mod display;
pub mod quota;
pub mod scheduler;

// Re-export commonly used types
pub use display::{resolve_display, DisplayTarget, ResolvedTarget};
pub use quota::{QuotaDenied, QuotaState, HOURLY_WINDOW};
pub use scheduler::{
    CaptureError, CaptureProvider, NoopCaptureProvider, RawImage, ScreenshotReason,
    ScreenshotRecord, ScreenshotScheduler,
};
