//! Configuration for the scheduler.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Jobs allowed in Running state at once, across all batches.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Root for per-job staging directories.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Upper bound on one job's conversion in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Capacity of each batch's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_workers() -> usize {
    3
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("convertino")
}

fn default_job_timeout() -> u64 {
    3600
}

fn default_event_buffer() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            temp_dir: default_temp_dir(),
            job_timeout_secs: default_job_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }
}
