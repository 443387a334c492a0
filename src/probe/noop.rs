//! Noop probe implementations.
//!
//! These exist so the agent compiles and runs on any target without
//! platform bindings. Real deployments register platform probes ahead of
//! these in the chain (or instead of them).

use crate::probe::chain::{ProbeError, WindowProbe};
use crate::probe::types::{DisplayInfo, WindowSnapshot};
use crate::probe::{DisplayProbe, IdleProbe};

/// A window probe that never resolves a window.
pub struct NoopWindowProbe;

impl WindowProbe for NoopWindowProbe {
    fn name(&self) -> &str {
        "noop"
    }

    fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError> {
        Ok(None)
    }
}

/// An idle probe that reports idle time as unavailable.
///
/// Consumers fall back to their own last-activity clock.
pub struct NoopIdleProbe;

impl IdleProbe for NoopIdleProbe {
    fn idle_seconds(&self) -> Option<u64> {
        None
    }
}

/// A display probe that reports no displays.
pub struct NoopDisplayProbe;

impl DisplayProbe for NoopDisplayProbe {
    fn displays(&self) -> Vec<DisplayInfo> {
        Vec::new()
    }
}
