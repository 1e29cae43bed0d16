use std::path::PathBuf;
use thiserror::Error;

use crate::capability::CapabilityError;

/// Errors returned synchronously by [`super::Scheduler::submit`].
///
/// Everything that goes wrong after a batch is accepted is reported per job.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Batch has no sources")]
    NoSources,

    #[error("Cannot determine the format of {path}")]
    UnknownFormat { path: PathBuf },

    #[error(transparent)]
    Unsupported(#[from] CapabilityError),

    #[error("Scheduler has no workers")]
    NoWorkers,

    #[error("Failed to prepare staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
