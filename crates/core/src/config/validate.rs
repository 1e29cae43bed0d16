use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one scheduler worker
/// - Undo history holds at least one entry
/// - Backend priority lists each kind once
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.scheduler.workers == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.workers must be at least 1".to_string(),
        ));
    }

    if config.store.history_limit == 0 {
        return Err(ConfigError::ValidationError(
            "store.history_limit must be at least 1".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for kind in &config.backends.priority {
        if !seen.insert(kind) {
            return Err(ConfigError::ValidationError(format!(
                "backends.priority lists '{}' more than once",
                kind
            )));
        }
    }

    Ok(())
}
