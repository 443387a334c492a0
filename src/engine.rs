//! Engine lifecycle and timer wiring.
//!
//! All engine state lives in one owned context constructed up front:
//! probes, the activity state machine, the optional screenshot scheduler,
//! the shared buffer, and the dispatcher. `start` spawns the timer tasks
//! under a single root cancellation token and `stop` tears everything down;
//! no background work survives it.

use crate::activity::ActivityStateMachine;
use crate::buffer::{EventBuffer, EventSink, Identity};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, UploadClient};
use crate::probe::{DisplayProbe, IdleProbe, ProbeChain};
use crate::screenshot::{CaptureProvider, ScreenshotScheduler};
use crate::stats::AgentStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The assembled telemetry engine.
pub struct Engine {
    config: Config,
    window_probe: Arc<ProbeChain>,
    idle_probe: Arc<dyn IdleProbe>,
    buffer: Arc<Mutex<EventBuffer>>,
    sink: EventSink,
    dispatcher: Arc<Dispatcher>,
    screenshots: Option<ScreenshotScheduler>,
    stats: Arc<AgentStats>,
    paused: Arc<AtomicBool>,
    flush_notify: Arc<Notify>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Assemble the engine. The screenshot scheduler is constructed here
    /// once, or not at all, depending on configuration; call sites never
    /// re-check the flag.
    pub fn new(
        config: Config,
        window_probe: ProbeChain,
        idle_probe: Arc<dyn IdleProbe>,
        display_probe: Arc<dyn DisplayProbe>,
        capture: Arc<dyn CaptureProvider>,
        upload: Arc<dyn UploadClient>,
        stats: Arc<AgentStats>,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(EventBuffer::new(
            config.buffer.batch_size,
            config.buffer.max_size,
        )));
        let flush_notify = Arc::new(Notify::new());
        let paused = Arc::new(AtomicBool::new(config.paused));
        let cancel = CancellationToken::new();

        let sink = EventSink::new(
            Identity::from(&config.collector),
            Arc::clone(&buffer),
            Arc::clone(&flush_notify),
            Arc::clone(&stats),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&buffer),
            upload,
            Arc::clone(&stats),
        ));

        let screenshots = if config.screenshot.enabled {
            Some(ScreenshotScheduler::new(
                config.screenshot.clone(),
                capture,
                display_probe,
                Arc::clone(&idle_probe),
                sink.clone(),
                Arc::clone(&stats),
                Arc::clone(&paused),
                cancel.child_token(),
            ))
        } else {
            None
        };

        Self {
            config,
            window_probe: Arc::new(window_probe),
            idle_probe,
            buffer,
            sink,
            dispatcher,
            screenshots,
            stats,
            paused,
            flush_notify,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the poll, capture, and flush tasks. Must run inside a tokio
    /// runtime.
    pub fn start(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            screenshots = self.screenshots.is_some(),
            "engine starting"
        );

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(self.spawn_poll_task());
        tasks.push(tokio::spawn(Arc::clone(&self.dispatcher).run(
            self.config.buffer.flush_interval,
            Arc::clone(&self.flush_notify),
            self.cancel.clone(),
        )));

        if let Some(ref scheduler) = self.screenshots {
            scheduler.start();
        }
    }

    /// Cancel all timers, join every task, flush what remains, persist
    /// stats.
    pub async fn stop(self) {
        info!("engine stopping");

        if let Some(ref scheduler) = self.screenshots {
            scheduler.stop();
        }
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = {
            let mut locked = self.tasks.lock().unwrap();
            locked.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }

        // The poll task may have pushed a final record after the
        // dispatcher's own final flush ran; flush once more.
        let dispatcher = Arc::clone(&self.dispatcher);
        let _ = tokio::task::spawn_blocking(move || dispatcher.flush()).await;

        if let Err(e) = self.stats.save() {
            warn!(error = %e, "could not persist stats");
        }

        info!("engine stopped");
    }

    /// Pause or resume collection. While paused the poll tick skips its
    /// work and capture requests are dropped; the dispatcher keeps
    /// draining whatever is already buffered.
    pub fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::SeqCst);
        if was != paused {
            info!(paused, "collection pause state changed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Current number of buffered, undelivered events.
    pub fn buffered_events(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn stats(&self) -> &Arc<AgentStats> {
        &self.stats
    }

    /// Request a manual capture, e.g. on operator demand.
    pub async fn request_manual_capture(&self) {
        if let Some(ref scheduler) = self.screenshots {
            scheduler
                .request_capture(crate::screenshot::ScreenshotReason::Manual)
                .await;
        }
    }

    fn spawn_poll_task(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        let chain = Arc::clone(&self.window_probe);
        let idle_probe = Arc::clone(&self.idle_probe);
        let sink = self.sink.clone();
        let scheduler = self.screenshots.clone();
        let paused = Arc::clone(&self.paused);
        let poll_interval = self.config.poll_interval;

        let mut machine = ActivityStateMachine::new(
            Duration::from_millis(self.config.min_activity_duration_ms),
            Duration::from_millis(self.config.max_idle_time_ms),
            Duration::from_millis(self.config.max_session_chunk_ms),
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Some(record) = machine.flush(Instant::now()) {
                            sink.push_activity(record);
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        if paused.load(Ordering::SeqCst) {
                            continue;
                        }

                        let snapshot = chain.snapshot().await;
                        let idle_seconds = idle_probe.idle_seconds();
                        let bounds = snapshot.bounds;

                        let outcome = machine.observe(snapshot, idle_seconds, Instant::now());
                        if let Some(record) = outcome.record {
                            sink.push_activity(record);
                        }
                        if outcome.window_changed {
                            if let Some(ref scheduler) = scheduler {
                                scheduler.notify_window_change(bounds);
                            }
                        }
                    }
                }
            }
        })
    }
}
