//! Configuration types for stream-dl
//!
//! [`Config`] holds the static engine tuning (intervals, grace periods, downloader flags).
//! Behavior an operator changes at runtime (paths, concurrency ceiling, transfer toggles)
//! lives in the settings table instead, see [`crate::settings::Settings`].

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`StreamDownloader`](crate::StreamDownloader)
///
/// Every field has a default, so `Config::default()` works out of the box and partial
/// JSON documents deserialize cleanly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Admission loop timing
    #[serde(default)]
    pub queue: QueueConfig,

    /// External downloader supervision
    #[serde(default)]
    pub process: ProcessConfig,

    /// Remote push and status monitoring
    #[serde(default)]
    pub remote: RemoteConfig,

    /// File server upload
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./stream-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Admission loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Interval between admission checks (default: 1s)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Back-off after an admission loop error (default: 5s)
    #[serde(default = "default_error_backoff", with = "duration_serde")]
    pub error_backoff: Duration,

    /// How long shutdown waits for running tasks to drain (default: 30s)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            error_backoff: default_error_backoff(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// External downloader supervision configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Value passed to `--thread-count` (default: 16)
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,

    /// Value passed to `--download-retry-count` (default: 5)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Time between the terminate signal and the kill signal (default: 5s)
    #[serde(default = "default_terminate_grace", with = "duration_serde")]
    pub terminate_grace: Duration,

    /// Upper bound on waiting for output readers after exit (default: 2s)
    #[serde(default = "default_reader_join_timeout", with = "duration_serde")]
    pub reader_join_timeout: Duration,

    /// Minimum spacing of progress writes to the store (default: 1s)
    #[serde(default = "default_progress_write_interval", with = "duration_serde")]
    pub progress_write_interval: Duration,

    /// Progress delta that forces a write regardless of spacing (default: 0.5)
    #[serde(default = "default_progress_delta_threshold")]
    pub progress_delta_threshold: f64,

    /// Extensions probed first when locating the output file, in order
    #[serde(default = "default_output_extensions")]
    pub output_extensions: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            retry_count: default_retry_count(),
            terminate_grace: default_terminate_grace(),
            reader_join_timeout: default_reader_join_timeout(),
            progress_write_interval: default_progress_write_interval(),
            progress_delta_threshold: default_progress_delta_threshold(),
            output_extensions: default_output_extensions(),
        }
    }
}

/// Remote downloader (aria2 JSON-RPC) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Timeout for the push request (default: 10s)
    #[serde(default = "default_push_timeout", with = "duration_serde")]
    pub push_timeout: Duration,

    /// Timeout for each status request (default: 5s)
    #[serde(default = "default_status_timeout", with = "duration_serde")]
    pub status_timeout: Duration,

    /// Interval between status checks while waiting to delete (default: 2s)
    #[serde(default = "default_monitor_poll_interval", with = "duration_serde")]
    pub monitor_poll_interval: Duration,

    /// Maximum status checks before giving up without deleting (default: 1800)
    #[serde(default = "default_monitor_max_polls")]
    pub monitor_max_polls: u32,

    /// Back-off after a failed status check (default: 5s)
    #[serde(default = "default_monitor_error_backoff", with = "duration_serde")]
    pub monitor_error_backoff: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            push_timeout: default_push_timeout(),
            status_timeout: default_status_timeout(),
            monitor_poll_interval: default_monitor_poll_interval(),
            monitor_max_polls: default_monitor_max_polls(),
            monitor_error_backoff: default_monitor_error_backoff(),
        }
    }
}

/// File server upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Control connection timeout (default: 30s)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Size of each block written to the data connection (default: 8192)
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            block_size: default_block_size(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./stream-dl.db")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_thread_count() -> u32 {
    16
}

fn default_retry_count() -> u32 {
    5
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_reader_join_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_progress_write_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_delta_threshold() -> f64 {
    0.5
}

fn default_output_extensions() -> Vec<String> {
    vec![
        ".mp4".to_string(),
        ".mkv".to_string(),
        ".ts".to_string(),
        ".m4a".to_string(),
    ]
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_monitor_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_monitor_max_polls() -> u32 {
    1800
}

fn default_monitor_error_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_block_size() -> usize {
    8192
}

// Duration serialization helper (whole seconds)
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
