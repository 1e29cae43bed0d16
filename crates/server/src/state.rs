use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use convertino_core::{
    BackendDirectory, CapabilityRegistry, Config, ConfigStore, SanitizedConfig, Scheduler,
};

/// Shared application state
pub struct AppState {
    config: Config,
    scheduler: Arc<Scheduler>,
    store: Mutex<ConfigStore>,
}

impl AppState {
    pub fn new(config: Config, scheduler: Arc<Scheduler>, store: ConfigStore) -> Self {
        Self {
            config,
            scheduler,
            store: Mutex::new(store),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        self.scheduler.registry()
    }

    pub fn directory(&self) -> &BackendDirectory {
        self.scheduler.directory()
    }

    /// Exclusive access to the settings store.
    pub async fn store(&self) -> MutexGuard<'_, ConfigStore> {
        self.store.lock().await
    }
}
