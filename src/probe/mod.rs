//! Platform observation seams.
//!
//! Everything in this module is a boundary to code that is unreliable by
//! nature: focused-window enumeration, system idle counters, and display
//! geometry. The engine consumes these behind traits and treats every
//! failure as a degraded value, never a fatal error.

pub mod chain;
pub mod noop;
pub mod types;

pub use chain::{ProbeChain, ProbeError, WindowProbe};
pub use noop::{NoopDisplayProbe, NoopIdleProbe, NoopWindowProbe};
pub use types::{DisplayInfo, RawBounds, Rect, WindowSnapshot};

/// System idle time source.
pub trait IdleProbe: Send + Sync {
    /// Elapsed idle time in seconds, or `None` when the counter is
    /// unavailable on this system.
    fn idle_seconds(&self) -> Option<u64>;
}

/// Physical display enumeration.
pub trait DisplayProbe: Send + Sync {
    /// The displays currently attached. May be empty.
    fn displays(&self) -> Vec<DisplayInfo>;
}
