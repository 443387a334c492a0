//! Vigil Agent - background desktop usage telemetry with batched delivery.
//!
//! This library observes which application/window has focus, how long, and
//! whether the user is idle, optionally captures screenshots under several
//! independent trigger conditions, and delivers batched events to a remote
//! collector over an unreliable network.
//!
//! # Guarantees
//!
//! - **Bounded memory**: the event buffer evicts its oldest entry at
//!   capacity rather than growing during collector outages
//! - **Bounded stalls**: every external call (window probe, capture,
//!   upload) runs under an explicit deadline
//! - **At-least-once delivery**: failed batches are requeued, never dropped
//!   outright
//! - **Nothing is fatal**: the worst outcome is bounded data loss, never a
//!   crash
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Vigil Agent                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────┐   ┌────────────┐            │
//! │  │  Probes  │──▶│  Activity    │──▶│   Event    │            │
//! │  │ (window, │   │ StateMachine │   │   Buffer   │            │
//! │  │  idle)   │   └──────────────┘   └────────────┘            │
//! │  └──────────┘          │                 │                   │
//! │        │               ▼                 ▼                   │
//! │        │      ┌──────────────┐   ┌────────────┐   ┌────────┐ │
//! │        └─────▶│  Screenshot  │   │ Dispatcher │──▶│ Upload │ │
//! │               │  Scheduler   │   │  (flush)   │   │ Client │ │
//! │               └──────────────┘   └────────────┘   └────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vigil_agent::{
//!     config::Config,
//!     dispatcher::HttpUploadClient,
//!     engine::Engine,
//!     probe::{NoopDisplayProbe, NoopIdleProbe, NoopWindowProbe, ProbeChain},
//!     screenshot::NoopCaptureProvider,
//!     stats::AgentStats,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let upload = Arc::new(HttpUploadClient::new(config.collector.clone())?);
//! let stats = AgentStats::shared_with_persistence(config.data_path.join("stats.json"));
//!
//! // Platform window probes and a capture backend are registered by the
//! // embedding application; the engine runs headless without them.
//! let mut chain = ProbeChain::new(Duration::from_millis(config.probe_deadline_ms));
//! chain.push(Arc::new(NoopWindowProbe));
//!
//! let engine = Engine::new(
//!     config,
//!     chain,
//!     Arc::new(NoopIdleProbe),
//!     Arc::new(NoopDisplayProbe),
//!     Arc::new(NoopCaptureProvider),
//!     upload,
//!     stats,
//! );
//! // engine.start() inside a tokio runtime; engine.stop().await to tear down.
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod probe;
pub mod screenshot;
pub mod stats;

// Re-export key types at crate root for convenience
pub use activity::{ActivityRecord, ActivityStateMachine, TickOutcome};
pub use buffer::{BufferedEvent, EventBuffer, EventSink, EventType, Identity};
pub use config::{BufferConfig, CollectorConfig, Config, ConfigError, ScreenshotConfig};
pub use dispatcher::{Dispatcher, FlushOutcome, HttpUploadClient, UploadClient, UploadError};
pub use engine::Engine;
pub use probe::{
    DisplayInfo, DisplayProbe, IdleProbe, ProbeChain, ProbeError, Rect, WindowProbe,
    WindowSnapshot,
};
pub use screenshot::{
    CaptureError, CaptureProvider, DisplayTarget, RawImage, ScreenshotReason, ScreenshotRecord,
    ScreenshotScheduler,
};
pub use stats::{AgentStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Collection disclosure that can be displayed to observed users.
pub const COLLECTION_DISCLOSURE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              VIGIL AGENT - COLLECTION DISCLOSURE                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records desktop usage telemetry for your            ║
║  organization's collector.                                       ║
║                                                                  ║
║  ✓ WHAT IS COLLECTED:                                            ║
║    • Focused application name, window title, and dwell time      ║
║    • Idle/active transitions                                     ║
║    • Screenshots, on a rate-limited schedule (if enabled)        ║
║                                                                  ║
║  ✗ WHAT IS NEVER COLLECTED:                                      ║
║    • Keystrokes or clipboard contents                            ║
║    • Continuous video of the screen                              ║
║                                                                  ║
║  Data is buffered locally and delivered in batches. When the     ║
║  collector is unreachable, the oldest undelivered events are     ║
║  discarded rather than accumulated without bound.                ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    vigil-agent status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
