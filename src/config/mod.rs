use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::runner::{BackoffKind, RetryPolicy};

pub mod generation;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the headless worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the Stable Diffusion web API
    #[serde(default = "default_sd_api_url")]
    pub sd_api_url: String,

    /// JSON file holding the persisted job queue
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,

    /// Directory of generation configurations (`{name}.json`)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory of wildcard files (`{name}.txt`)
    #[serde(default = "default_wildcards_dir")]
    pub wildcards_dir: PathBuf,

    /// JSON file holding wildcard rotation state
    #[serde(default = "default_wildcard_state_file")]
    pub wildcard_state_file: PathBuf,

    /// Root directory for generated images
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Timeout for a single remote generation call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries per image after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff growth between retries: "fixed" or "exponential"
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: BackoffKind,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for exponential backoff, in milliseconds
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Idle poll interval of the batch runner, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_sd_api_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("data/queue.json")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("configs")
}

fn default_wildcards_dir() -> PathBuf {
    PathBuf::from("wildcards")
}

fn default_wildcard_state_file() -> PathBuf {
    PathBuf::from("data/wildcard_state.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_retry_backoff_max_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
            base_delay: Duration::from_millis(self.retry_backoff_ms),
            max_delay: Duration::from_millis(self.retry_backoff_max_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
