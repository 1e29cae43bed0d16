use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::capability::BackendKind;
use crate::scheduler::SchedulerConfig;
use crate::settings::default_settings_path;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

/// Settings store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
    /// Undo history depth.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Whether undo history survives restarts.
    #[serde(default = "default_true")]
    pub persist_history: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            history_limit: default_history_limit(),
            persist_history: true,
        }
    }
}

fn default_history_limit() -> usize {
    50
}

fn default_true() -> bool {
    true
}

/// Backend discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendsConfig {
    /// Preferred backends, ahead of the built-in order.
    #[serde(default)]
    pub priority: Vec<BackendKind>,
    /// Root of tools shipped next to the application (e.g. `deps/`).
    #[serde(default)]
    pub bundled_dir: Option<PathBuf>,
    /// Timeout for a single external tool invocation.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            priority: Vec::new(),
            bundled_dir: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_tool_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Config view for API responses (local paths reduced to presence flags)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub scheduler: SanitizedSchedulerConfig,
    pub store: SanitizedStoreConfig,
    pub backends: SanitizedBackendsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSchedulerConfig {
    pub workers: usize,
    pub job_timeout_secs: u64,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStoreConfig {
    pub history_limit: usize,
    pub persist_history: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBackendsConfig {
    pub priority: Vec<BackendKind>,
    pub bundled_dir_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            scheduler: SanitizedSchedulerConfig {
                workers: config.scheduler.workers,
                job_timeout_secs: config.scheduler.job_timeout_secs,
                event_buffer: config.scheduler.event_buffer,
            },
            store: SanitizedStoreConfig {
                history_limit: config.store.history_limit,
                persist_history: config.store.persist_history,
            },
            backends: SanitizedBackendsConfig {
                priority: config.backends.priority.clone(),
                bundled_dir_configured: config.backends.bundled_dir.is_some(),
                timeout_secs: config.backends.timeout_secs,
            },
            logging: config.logging.clone(),
        }
    }
}
