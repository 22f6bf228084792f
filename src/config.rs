//! Configuration types for partjoin

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Environment variable naming the download directory
pub const ENV_DOWNLOAD_DIR: &str = "PARTJOIN_DOWNLOAD_DIR";
/// Environment variable overriding the concatenation buffer size in bytes
pub const ENV_CHUNK_SIZE: &str = "PARTJOIN_CHUNK_SIZE";
/// Environment variable overriding the debounce interval in milliseconds
pub const ENV_DEBOUNCE_MS: &str = "PARTJOIN_DEBOUNCE_MS";
/// Environment variable overriding the settle delay in milliseconds
pub const ENV_SETTLE_MS: &str = "PARTJOIN_SETTLE_MS";

/// Fragment joining behavior (timing, buffering, progress reporting)
///
/// Groups the settings that drive the gate, the reassembler and the deferred
/// re-check. Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Buffer size for streamed concatenation in bytes (default: 8 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum interval between two gate evaluations of the same archive (default: 3 seconds)
    #[serde(default = "default_debounce_interval", with = "duration_ms_serde")]
    pub debounce_interval: Duration,

    /// Delay before the deferred re-check scheduled by each completion event (default: 5 seconds)
    #[serde(default = "default_settle_delay", with = "duration_ms_serde")]
    pub settle_delay: Duration,

    /// Minimum time between two progress reports (default: 2 seconds)
    #[serde(default = "default_progress_interval", with = "duration_ms_serde")]
    pub progress_interval: Duration,

    /// Minimum change in percent between two progress reports (default: 1.0)
    #[serde(default = "default_progress_step")]
    pub progress_step_percent: f32,

    /// Number of on-disk fragments required before a set counts as multi-part (default: 2)
    ///
    /// Values below 2 are rejected by [`Config::validate`]: a lone file that merely
    /// looks like a fragment is never joined.
    #[serde(default = "default_min_fragments")]
    pub min_fragments: usize,

    /// Delete the partially written output when a join is cancelled (default: true)
    #[serde(default = "default_true")]
    pub remove_partial_on_cancel: bool,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            debounce_interval: default_debounce_interval(),
            settle_delay: default_settle_delay(),
            progress_interval: default_progress_interval(),
            progress_step_percent: default_progress_step(),
            min_fragments: default_min_fragments(),
            remove_partial_on_cancel: true,
            event_channel_capacity: default_event_capacity(),
        }
    }
}

/// Disk space checking configuration (pre-join validation)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra free space to keep after the output is written, in bytes (default: 0)
    #[serde(default)]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: 0,
        }
    }
}

/// Notification configuration (webhooks)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Main configuration for the reassembly coordinator
///
/// Fields are organized into logical sub-configs:
/// - [`join`](JoinConfig): timing, buffering, progress reporting
/// - [`disk_space`](DiskSpaceConfig): pre-join free space check
/// - [`notifications`](NotificationConfig): webhooks
///
/// `join` is flattened so the JSON format keeps its settings at the top level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Flat directory where fragments arrive and joined outputs are written (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Fragment joining behavior
    #[serde(flatten)]
    pub join: JoinConfig,

    /// Disk space checking
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Outcome notifications
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            join: JoinConfig::default(),
            disk_space: DiskSpaceConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults. The loaded configuration is validated.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Reads [`ENV_DOWNLOAD_DIR`] (default `./downloads`) and the optional
    /// numeric overrides [`ENV_CHUNK_SIZE`], [`ENV_DEBOUNCE_MS`] and [`ENV_SETTLE_MS`].
    /// Everything else keeps its default.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var(ENV_DOWNLOAD_DIR) {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(chunk) = env_number(ENV_CHUNK_SIZE, "chunk_size")? {
            config.join.chunk_size = chunk as usize;
        }
        if let Some(ms) = env_number(ENV_DEBOUNCE_MS, "debounce_interval")? {
            config.join.debounce_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number(ENV_SETTLE_MS, "settle_delay")? {
            config.join.settle_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.join.chunk_size == 0 {
            return Err(Error::config(
                "chunk_size",
                "chunk_size must be greater than zero",
            ));
        }
        if self.join.min_fragments < 2 {
            return Err(Error::config(
                "min_fragments",
                "min_fragments must be at least 2; a single file is never joined",
            ));
        }
        let step = self.join.progress_step_percent;
        if step.is_nan() || step <= 0.0 {
            return Err(Error::config(
                "progress_step_percent",
                "progress_step_percent must be positive",
            ));
        }
        if self.join.event_channel_capacity == 0 {
            return Err(Error::config(
                "event_channel_capacity",
                "event_channel_capacity must be greater than zero",
            ));
        }
        for webhook in &self.notifications.webhooks {
            if webhook.url.is_empty() {
                return Err(Error::config("webhooks", "webhook url must not be empty"));
            }
        }
        Ok(())
    }
}

fn env_number(var: &str, key: &str) -> Result<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            Error::config(key, format!("{var}='{raw}' is not a valid number: {e}"))
        }),
        Err(_) => Ok(None),
    }
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    /// Triggered when a join finishes (including joins with a size mismatch)
    OnComplete,
    /// Triggered when a join fails or is cancelled
    OnFailed,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_chunk_size() -> usize {
    8 * 1024 * 1024
}

fn default_debounce_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_progress_step() -> f32 {
    1.0
}

fn default_min_fragments() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1000
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
