//! LibreOffice backend for document and presentation formats.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::process::run_tool;
use super::traits::Backend;
use super::types::{
    report_progress, BackendStatus, ConversionRequest, ProgressSender, RawResult,
};
use crate::capability::BackendKind;

/// Executable names, most specific first.
pub(crate) const OFFICE_NAMES: &[&str] = &["soffice", "libreoffice"];

/// `--convert-to` argument for an output extension.
fn export_filter(extension: &str) -> String {
    match extension {
        "txt" => "txt:Text".to_string(),
        other => other.to_string(),
    }
}

/// Runs a headless export of `source` to `extension`.
///
/// Output lands in `<staging>/<subdir>` under the source's own stem, which is
/// how soffice names it. A private profile directory inside staging keeps
/// concurrent instances from fighting over the user profile lock.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn export_with_office(
    kind: BackendKind,
    program: &Path,
    source: &Path,
    staging_dir: &Path,
    subdir: &str,
    extension: &str,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<PathBuf, BackendError> {
    let out_dir = staging_dir.join(subdir);
    tokio::fs::create_dir_all(&out_dir).await?;
    let profile = staging_dir.join(".lo_profile");

    let args = vec![
        "--headless".to_string(),
        "--norestore".to_string(),
        format!("-env:UserInstallation=file://{}", profile.to_string_lossy()),
        "--convert-to".to_string(),
        export_filter(extension),
        "--outdir".to_string(),
        out_dir.to_string_lossy().to_string(),
        source.to_string_lossy().to_string(),
    ];

    let output = run_tool(kind, program, &args, timeout_secs, cancel).await?;

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let produced = out_dir.join(format!("{}.{}", stem, extension));

    // soffice exits 0 even when the import filter rejects the file.
    if !produced.is_file() {
        return Err(BackendError::NoOutput {
            expected: produced,
            diagnostics: super::error::diagnostics_tail(&output.combined()),
        });
    }
    Ok(produced)
}

/// Document conversion through `soffice --convert-to`.
pub struct OfficeBackend {
    timeout_secs: u64,
}

impl OfficeBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Backend for OfficeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Office
    }

    async fn detect(&self, locator: &ToolLocator) -> BackendStatus {
        locator
            .detect_tool(BackendKind::Office, OFFICE_NAMES, &["--version"])
            .await
    }

    async fn convert(
        &self,
        status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let program = status
            .path
            .as_deref()
            .ok_or_else(|| BackendError::unavailable(BackendKind::Office, "no executable path"))?;

        let produced = export_with_office(
            BackendKind::Office,
            program,
            &request.source,
            &request.staging_dir,
            ".office_out",
            request.output.extension(),
            self.timeout_secs,
            &request.cancel,
        )
        .await?;

        let target = request.artifact_path(None);
        tokio::fs::rename(&produced, &target).await?;
        debug!(job_id = %request.job_id, path = %target.display(), "Office export complete");

        report_progress(&progress, 1.0);
        Ok(RawResult::single(target, request.output.clone()))
    }
}
