//! Configuration types for http-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, transfer buffer)
///
/// Groups settings related to how files are fetched and where they land.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    ///
    /// Requests with a relative destination path are resolved against it.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory for working files (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Transfer buffer size in bytes (default: 2048)
    ///
    /// The body is written to the working file in slices of this size; the
    /// pause check runs between slices, so a larger buffer trades pause
    /// responsiveness for fewer store reads.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./http-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Capacity of the in-memory task cache (default: 30 entries)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Backoff policy applied between failed attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Delay grows linearly: `delay * attempt`
    Linear,
    /// Delay doubles per attempt: `delay * 2^(attempt - 1)` (default)
    #[default]
    Exponential,
}

/// Scheduling configuration handed to the job-scheduling facility
///
/// Mirrors the host facility's job-request knobs: an execution window the
/// first run must start within, backoff criteria for reruns, and the
/// network/persistence requirement flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Earliest start of the execution window (default: 1 second)
    #[serde(default = "default_window_start", with = "duration_serde")]
    pub execution_window_start: Duration,

    /// Latest start of the execution window (default: 2 minutes)
    #[serde(default = "default_window_end", with = "duration_serde")]
    pub execution_window_end: Duration,

    /// Base delay between failed attempts (default: 30 seconds)
    #[serde(default = "default_backoff_delay", with = "duration_serde")]
    pub backoff_delay: Duration,

    /// How the delay grows across attempts
    #[serde(default)]
    pub backoff_policy: BackoffPolicy,

    /// Cap on the computed backoff delay (default: 1 hour)
    #[serde(default = "default_max_backoff", with = "duration_serde")]
    pub max_backoff: Duration,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Require network connectivity before running (default: true)
    ///
    /// Recorded for the host facility; the in-process scheduler does not
    /// probe connectivity itself.
    #[serde(default = "default_true")]
    pub require_network: bool,

    /// Keep scheduled jobs across process restarts (default: true)
    ///
    /// The in-process scheduler realizes this by re-scheduling every
    /// active task from the store at startup.
    #[serde(default = "default_true")]
    pub persisted: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            execution_window_start: default_window_start(),
            execution_window_end: default_window_end(),
            backoff_delay: default_backoff_delay(),
            backoff_policy: BackoffPolicy::default(),
            max_backoff: default_max_backoff(),
            jitter: true,
            require_network: true,
            persisted: true,
        }
    }
}

/// Main configuration for HttpDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — directories, transfer buffer
/// - [`persistence`](PersistenceConfig) — database path, cache capacity
/// - [`scheduler`](SchedulerConfig) — execution window, backoff criteria
///
/// The download and scheduler sub-configs are flattened for serialization,
/// so the JSON/TOML format stays un-nested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Scheduling and backoff settings
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,
}

// Convenience accessors — delegate to the sub-config structs.
impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Scratch directory for working files
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_buffer_size() -> usize {
    2048
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./http-dl.db")
}

fn default_cache_capacity() -> usize {
    30
}

fn default_window_start() -> Duration {
    Duration::from_secs(1)
}

fn default_window_end() -> Duration {
    Duration::from_secs(120)
}

fn default_backoff_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(3600)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds as u64)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
