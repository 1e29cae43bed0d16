//! The backend adapter interface.

use async_trait::async_trait;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::types::{BackendStatus, ConversionRequest, ProgressSender, RawResult};
use crate::capability::BackendKind;

/// An external (or built-in) conversion tool.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which variant this adapter implements.
    fn kind(&self) -> BackendKind;

    /// Locates the tool and probes its version.
    ///
    /// Called once and cached by [`super::BackendDirectory`].
    async fn detect(&self, locator: &ToolLocator) -> BackendStatus;

    /// Runs one conversion.
    ///
    /// Writes only inside `request.staging_dir` and returns the artifacts in
    /// selection order. Must observe `request.cancel` while the tool runs.
    async fn convert(
        &self,
        status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError>;
}
