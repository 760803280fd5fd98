use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::RetryPolicy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long in-flight HTTP requests may drain after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Upper bound for an upload request body.
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_upload() -> usize {
    10 << 20
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("imgqueue.db")
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory holding the `original`, `resized`, `thumbnails`
    /// and `watermarked` namespaces.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data/images")
}

/// Durable queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Topic the image jobs are published to.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group whose committed offset is tracked.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// How long the consumer waits before polling an empty queue again.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            group_id: default_group_id(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_topic() -> String {
    "images".to_string()
}

fn default_group_id() -> String {
    "image-processor".to_string()
}

fn default_poll_interval() -> u64 {
    250
}

/// Retry policy shared by enqueue, fetch and commit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total number of tries (not re-tries).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the second try.
    #[serde(default = "default_delay")]
    pub delay_ms: u64,
    /// Multiplier applied to the delay after every failed try.
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay(),
            backoff: default_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempts,
            Duration::from_millis(self.delay_ms),
            self.backoff,
        )
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_delay() -> u64 {
    100
}

fn default_backoff() -> f64 {
    2.0
}

/// Consume loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Pause after fetch retries are exhausted.
    #[serde(default = "default_fetch_error_backoff")]
    pub fetch_error_backoff_ms: u64,
    /// Upper bound for a single job (load + transform + persist).
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// How many times a transiently failing message is redelivered before
    /// it is dead-lettered.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            fetch_error_backoff_ms: default_fetch_error_backoff(),
            job_timeout_secs: default_job_timeout(),
            max_redeliveries: default_max_redeliveries(),
        }
    }
}

fn default_fetch_error_backoff() -> u64 {
    500
}

fn default_job_timeout() -> u64 {
    120
}

fn default_max_redeliveries() -> u32 {
    3
}

/// Transformation engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_jpeg_quality() -> u8 {
    90
}

/// Reconciliation sweep for pending originals that never got processed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
    /// Minimum age of a pending original before it is re-enqueued.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    300
}
