//! Integration tests for the assembled engine.
//!
//! Drives the full pipeline (probes, state machine, buffer, dispatcher,
//! upload) with fake collaborators and a real runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_agent::buffer::{BufferedEvent, EventData, EventType};
use vigil_agent::config::{BufferConfig, Config, ScreenshotConfig};
use vigil_agent::dispatcher::{UploadClient, UploadError};
use vigil_agent::engine::Engine;
use vigil_agent::probe::{
    DisplayProbe, IdleProbe, ProbeChain, ProbeError, WindowProbe, WindowSnapshot,
};
use vigil_agent::screenshot::{
    CaptureError, CaptureProvider, DisplayTarget, RawImage, ResolvedTarget, ScreenshotReason,
};
use vigil_agent::stats::AgentStats;

/// Window probe whose reading is set by the test.
struct ScriptedWindowProbe {
    current: Mutex<Option<WindowSnapshot>>,
}

impl ScriptedWindowProbe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
        })
    }

    fn focus(&self, application: &str, title: &str) {
        *self.current.lock().unwrap() = Some(WindowSnapshot {
            application: application.to_string(),
            title: title.to_string(),
            ..Default::default()
        });
    }
}

impl WindowProbe for ScriptedWindowProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    fn snapshot(&self) -> Result<Option<WindowSnapshot>, ProbeError> {
        Ok(self.current.lock().unwrap().clone())
    }
}

struct ScriptedIdleProbe {
    idle_seconds: Mutex<Option<u64>>,
}

impl ScriptedIdleProbe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            idle_seconds: Mutex::new(Some(0)),
        })
    }
}

impl IdleProbe for ScriptedIdleProbe {
    fn idle_seconds(&self) -> Option<u64> {
        *self.idle_seconds.lock().unwrap()
    }
}

struct NoDisplays;

impl DisplayProbe for NoDisplays {
    fn displays(&self) -> Vec<vigil_agent::probe::DisplayInfo> {
        Vec::new()
    }
}

struct OkCaptureProvider;

impl CaptureProvider for OkCaptureProvider {
    fn capture(
        &self,
        _reason: ScreenshotReason,
        _target: ResolvedTarget,
    ) -> Result<RawImage, CaptureError> {
        Ok(RawImage {
            width: 1,
            height: 1,
            bytes: vec![0xff],
        })
    }
}

struct RecordingUploadClient {
    fail: AtomicBool,
    batches: Mutex<Vec<Vec<BufferedEvent>>>,
}

impl RecordingUploadClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            batches: Mutex::new(Vec::new()),
        })
    }

    fn delivered(&self) -> Vec<BufferedEvent> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

impl UploadClient for RecordingUploadClient {
    fn send_batch(&self, events: &[BufferedEvent]) -> Result<(), UploadError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Network("unreachable".to_string()));
        }
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        poll_interval: Duration::from_millis(50),
        probe_deadline_ms: 500,
        min_activity_duration_ms: 10,
        max_idle_time_ms: 60_000,
        max_session_chunk_ms: 60_000,
        screenshot: ScreenshotConfig {
            enabled: true,
            interval_ms: 0,
            min_interval_ms: 0,
            window_change_interval_ms: 0,
            window_change_debounce_ms: 50,
            max_per_hour: 1_000,
            idle_threshold_ms: 60_000,
            resume_capture_on_active: true,
            display_target: DisplayTarget::Primary,
        },
        buffer: BufferConfig {
            batch_size: 100,
            max_size: 1_000,
            flush_interval: Duration::from_millis(100),
        },
        ..Config::default()
    }
}

struct TestRig {
    engine: Engine,
    window: Arc<ScriptedWindowProbe>,
    upload: Arc<RecordingUploadClient>,
}

fn rig(config: Config) -> TestRig {
    let window = ScriptedWindowProbe::new();
    let upload = RecordingUploadClient::new();

    let mut chain = ProbeChain::new(Duration::from_millis(config.probe_deadline_ms));
    chain.push(Arc::clone(&window) as Arc<dyn WindowProbe>);

    let engine = Engine::new(
        config,
        chain,
        ScriptedIdleProbe::new(),
        Arc::new(NoDisplays),
        Arc::new(OkCaptureProvider),
        Arc::clone(&upload) as Arc<dyn UploadClient>,
        Arc::new(AgentStats::new()),
    );

    TestRig {
        engine,
        window,
        upload,
    }
}

/// Poll until `check` passes or the deadline elapses.
async fn wait_for<F: Fn() -> bool>(check: F, what: &str) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_activity_flows_end_to_end() {
    let rig = rig(test_config());
    rig.window.focus("editor", "main.rs");
    rig.engine.start();

    tokio::time::sleep(Duration::from_millis(300)).await;
    rig.window.focus("browser", "docs");

    let upload = Arc::clone(&rig.upload);
    wait_for(
        move || {
            upload.delivered().iter().any(|e| {
                e.event_type == EventType::WindowActivity
                    && matches!(
                        &e.data,
                        EventData::WindowActivity(r) if r.application == "editor"
                    )
            })
        },
        "editor activity record to be delivered",
    )
    .await;

    let delivered = rig.upload.delivered();
    let record = delivered
        .iter()
        .find_map(|e| match &e.data {
            EventData::WindowActivity(r) if r.application == "editor" => Some(r.clone()),
            _ => None,
        })
        .unwrap();
    assert!(record.duration_ms >= 200, "span covers the dwell time");
    assert!(!record.is_idle);

    rig.engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tracking_start_screenshot_is_delivered() {
    let rig = rig(test_config());
    rig.window.focus("editor", "main.rs");
    rig.engine.start();

    let upload = Arc::clone(&rig.upload);
    wait_for(
        move || {
            upload.delivered().iter().any(|e| {
                e.event_type == EventType::Screenshot
                    && e.reason.as_deref() == Some("tracking_start")
            })
        },
        "tracking_start screenshot to be delivered",
    )
    .await;

    rig.engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_window_change_triggers_debounced_screenshot() {
    let rig = rig(test_config());
    rig.window.focus("editor", "main.rs");
    rig.engine.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.window.focus("browser", "docs");

    let upload = Arc::clone(&rig.upload);
    wait_for(
        move || {
            upload.delivered().iter().any(|e| {
                e.event_type == EventType::Screenshot
                    && e.reason.as_deref() == Some("window_change")
            })
        },
        "window_change screenshot to be delivered",
    )
    .await;

    rig.engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_delivery_requeues_until_collector_returns() {
    let rig = rig(test_config());
    rig.upload.fail.store(true, Ordering::SeqCst);
    rig.window.focus("editor", "main.rs");
    rig.engine.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.window.focus("browser", "docs");

    // Events accumulate locally while the collector is down.
    wait_for(|| rig.engine.buffered_events() > 0, "events to be buffered").await;
    assert!(rig.upload.delivered().is_empty());

    // Collector back: the requeued events drain.
    rig.upload.fail.store(false, Ordering::SeqCst);
    let upload = Arc::clone(&rig.upload);
    wait_for(
        move || !upload.delivered().is_empty(),
        "requeued events to be delivered",
    )
    .await;

    rig.engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_flushes_final_record_and_halts() {
    let rig = rig(test_config());
    rig.window.focus("editor", "main.rs");
    rig.engine.start();

    tokio::time::sleep(Duration::from_millis(300)).await;
    rig.engine.stop().await;

    // The open span was closed and delivered on shutdown.
    let delivered = rig.upload.delivered();
    assert!(delivered.iter().any(|e| {
        matches!(&e.data, EventData::WindowActivity(r) if r.application == "editor")
    }));

    // Nothing runs after stop.
    let count = rig.upload.batches.lock().unwrap().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rig.upload.batches.lock().unwrap().len(), count);
}
