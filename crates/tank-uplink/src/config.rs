//! Pipeline configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Batching and delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Directory for pending and dead-lettered package files
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Records per kind that trigger a package
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Retries after the first failed upload
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts, in seconds
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    /// Pause between attempts in milliseconds; overrides `backoff_secs` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("packages")
}

fn default_threshold() -> usize {
    6
}

fn default_max_retries() -> u32 {
    10
}

fn default_backoff_secs() -> u64 {
    60
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            threshold: default_threshold(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            backoff_ms: None,
        }
    }
}

impl UplinkConfig {
    pub fn backoff(&self) -> Duration {
        match self.backoff_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.backoff_secs),
        }
    }

    /// Threshold of at least one record
    pub fn effective_threshold(&self) -> usize {
        self.threshold.max(1)
    }
}
