use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The settings file could not be read, parsed or written.
    #[error("Settings persistence failed for {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Preset {0} is built in and cannot be changed")]
    BuiltinPreset(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Settings writer is not running")]
    WriterClosed,
}

impl StoreError {
    pub(crate) fn persistence(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
