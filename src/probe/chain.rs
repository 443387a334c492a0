//! Layered window probing with per-strategy deadlines.
//!
//! Platform-specific "what has focus" probes are unreliable: they can hang,
//! fail, or come back empty. The chain tries an ordered list of strategies,
//! each on a blocking worker with its own deadline, and takes the first
//! usable snapshot. Exhaustion degrades to an empty snapshot so a broken
//! probe can never stall the poll tick.

use crate::probe::types::WindowSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors a probe strategy can report.
#[derive(Debug)]
pub enum ProbeError {
    /// The probe cannot run on this system (missing API, no permission)
    Unavailable(String),
    /// The probe ran but failed
    Failed(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Unavailable(msg) => write!(f, "probe unavailable: {msg}"),
            ProbeError::Failed(msg) => write!(f, "probe failed: {msg}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// One strategy for resolving the focused window.
///
/// Implementations may block; the chain enforces the deadline.
pub trait WindowProbe: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Resolve the currently focused window, or `None` when nothing has focus.
    fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError>;
}

/// Ordered list of window probe strategies with a per-strategy deadline.
pub struct ProbeChain {
    strategies: Vec<Arc<dyn WindowProbe>>,
    deadline: Duration,
}

impl ProbeChain {
    /// Create an empty chain with the given per-strategy deadline.
    pub fn new(deadline: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            deadline,
        }
    }

    /// Append a strategy. Strategies are tried in insertion order.
    pub fn push(&mut self, probe: Arc<dyn WindowProbe>) {
        self.strategies.push(probe);
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolve the focused window, trying each strategy in order.
    ///
    /// First usable snapshot wins. A strategy that times out, errors, or
    /// returns nothing is skipped. Returns an empty snapshot when every
    /// strategy is exhausted.
    pub async fn snapshot(&self) -> WindowSnapshot {
        for probe in &self.strategies {
            let name = probe.name().to_string();
            let worker = Arc::clone(probe);
            let attempt = tokio::time::timeout(
                self.deadline,
                tokio::task::spawn_blocking(move || worker.snapshot()),
            )
            .await;

            match attempt {
                Ok(Ok(Ok(Some(snapshot)))) if !snapshot.is_empty() => return snapshot,
                Ok(Ok(Ok(_))) => {
                    debug!(probe = %name, "window probe returned nothing");
                }
                Ok(Ok(Err(e))) => {
                    debug!(probe = %name, error = %e, "window probe failed");
                }
                Ok(Err(e)) => {
                    warn!(probe = %name, error = %e, "window probe worker panicked");
                }
                Err(_) => {
                    warn!(probe = %name, deadline_ms = self.deadline.as_millis() as u64,
                        "window probe timed out");
                }
            }
        }

        WindowSnapshot::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        name: &'static str,
        result: Option<WindowSnapshot>,
    }

    impl WindowProbe for FixedProbe {
        fn name(&self) -> &str {
            self.name
        }

        fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError> {
            Ok(self.result.clone())
        }
    }

    struct FailingProbe;

    impl WindowProbe for FailingProbe {
        fn name(&self) -> &str {
            "failing"
        }

        fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError> {
            Err(ProbeError::Failed("boom".to_string()))
        }
    }

    struct HangingProbe;

    impl WindowProbe for HangingProbe {
        fn name(&self) -> &str {
            "hanging"
        }

        fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError> {
            std::thread::sleep(std::time::Duration::from_secs(2));
            Ok(None)
        }
    }

    fn named(app: &str) -> WindowSnapshot {
        WindowSnapshot {
            application: app.to_string(),
            title: "t".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let mut chain = ProbeChain::new(Duration::from_millis(500));
        chain.push(Arc::new(FixedProbe {
            name: "a",
            result: Some(named("first")),
        }));
        chain.push(Arc::new(FixedProbe {
            name: "b",
            result: Some(named("second")),
        }));

        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.application, "first");
    }

    #[tokio::test]
    async fn test_failure_falls_through() {
        let mut chain = ProbeChain::new(Duration::from_millis(500));
        chain.push(Arc::new(FailingProbe));
        chain.push(Arc::new(FixedProbe {
            name: "b",
            result: Some(named("fallback")),
        }));

        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.application, "fallback");
    }

    #[tokio::test]
    async fn test_exhaustion_degrades_to_empty() {
        let mut chain = ProbeChain::new(Duration::from_millis(500));
        chain.push(Arc::new(FailingProbe));
        chain.push(Arc::new(FixedProbe {
            name: "b",
            result: None,
        }));

        let snapshot = chain.snapshot().await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_hung_probe_is_bounded() {
        let mut chain = ProbeChain::new(Duration::from_millis(50));
        chain.push(Arc::new(HangingProbe));
        chain.push(Arc::new(FixedProbe {
            name: "b",
            result: Some(named("after-hang")),
        }));

        let started = std::time::Instant::now();
        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.application, "after-hang");
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
