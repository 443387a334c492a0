//! Configuration for the vigil telemetry agent.

use crate::screenshot::display::DisplayTarget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often the focused window is polled
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Per-strategy deadline for window probe calls (milliseconds)
    pub probe_deadline_ms: u64,

    /// Activity spans shorter than this are not recorded (milliseconds)
    pub min_activity_duration_ms: u64,

    /// Elapsed input-free time after which the user counts as idle (milliseconds)
    pub max_idle_time_ms: u64,

    /// Forced split of one window's dwell time into bounded records (milliseconds)
    pub max_session_chunk_ms: u64,

    /// Screenshot trigger settings
    pub screenshot: ScreenshotConfig,

    /// Event buffering and flush settings
    pub buffer: BufferConfig,

    /// Collector endpoint and attribution
    pub collector: CollectorConfig,

    /// Path for storing state and stats
    pub data_path: PathBuf,

    /// Whether collection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vigil-agent");

        Self {
            poll_interval: Duration::from_secs(10),
            probe_deadline_ms: 2_000,
            min_activity_duration_ms: 1_000,
            max_idle_time_ms: 300_000,
            max_session_chunk_ms: 300_000,
            screenshot: ScreenshotConfig::default(),
            buffer: BufferConfig::default(),
            collector: CollectorConfig::default(),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vigil-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Screenshot trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Master switch; when false no scheduler is constructed at all
    pub enabled: bool,

    /// Recurring time-based capture interval (milliseconds)
    pub interval_ms: u64,

    /// Minimum spacing between any two captures (milliseconds)
    pub min_interval_ms: u64,

    /// Shorter minimum spacing applied to window-change captures (milliseconds)
    pub window_change_interval_ms: u64,

    /// Settle delay for window-change bursts (milliseconds)
    pub window_change_debounce_ms: u64,

    /// Rolling hourly capture cap
    pub max_per_hour: usize,

    /// Input-free time after which capture triggers are gated off (milliseconds)
    pub idle_threshold_ms: u64,

    /// Fire one capture immediately when the user becomes active again
    pub resume_capture_on_active: bool,

    /// Which display(s) to capture
    pub display_target: DisplayTarget,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 300_000,
            min_interval_ms: 60_000,
            window_change_interval_ms: 30_000,
            window_change_debounce_ms: 2_000,
            max_per_hour: 20,
            idle_threshold_ms: 300_000,
            resume_capture_on_active: true,
            display_target: DisplayTarget::Primary,
        }
    }
}

/// Event buffering and flush settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Buffered-event count that triggers an immediate flush
    pub batch_size: usize,

    /// Hard cap on buffered events; oldest are evicted beyond this
    pub max_size: usize,

    /// Periodic flush interval
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_size: 1_000,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Collector endpoint and event attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collector base URL
    pub base_url: String,

    /// Bearer authentication token
    pub token: String,

    /// Username stamped on every event
    pub username: String,

    /// Device identifier stamped on every event; generated once and persisted
    pub device_id: String,

    /// Tenant/domain stamped on every event
    pub domain: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!(
            "agent-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            token: String::new(),
            username,
            device_id,
            domain: "default".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Get the batched events endpoint URL.
    pub fn events_url(&self) -> String {
        format!("{}/v1/events", self.base_url.trim_end_matches('/'))
    }

    /// Get the single-screenshot payload endpoint URL.
    pub fn screenshot_url(&self) -> String {
        format!("{}/v1/screenshot", self.base_url.trim_end_matches('/'))
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
