use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration: defaults, then the TOML file if it exists, then
/// `CONVERTINO_<SECTION>__<KEY>` environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
    }

    let config: Config = figment
        .merge(Env::prefixed("CONVERTINO_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
