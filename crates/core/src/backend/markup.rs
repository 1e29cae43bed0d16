//! Pandoc backend for markup formats.

use async_trait::async_trait;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::process::run_tool;
use super::traits::Backend;
use super::types::{
    report_progress, BackendStatus, ConversionRequest, ProgressSender, RawResult,
};
use crate::capability::{BackendKind, Format};

/// Pandoc reader name for an input format.
fn reader(format: &Format) -> &str {
    match format.as_str() {
        "md" | "txt" => "markdown",
        "tex" => "latex",
        "html" => "html",
        other => other,
    }
}

/// Pandoc writer name; `None` for PDF, which pandoc infers from the extension.
fn writer(format: &Format) -> Option<&str> {
    match format.as_str() {
        "pdf" => None,
        "txt" => Some("plain"),
        "md" => Some("markdown"),
        "tex" => Some("latex"),
        other => Some(other),
    }
}

/// Markup conversion via pandoc.
pub struct MarkupBackend {
    timeout_secs: u64,
    pdf_engine: String,
}

impl MarkupBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            pdf_engine: "pdflatex".to_string(),
        }
    }

    pub(crate) fn build_args(&self, request: &ConversionRequest) -> Vec<String> {
        let mut args = vec![
            request.source.to_string_lossy().to_string(),
            "-f".to_string(),
            reader(&request.input).to_string(),
        ];

        match writer(&request.output) {
            Some(name) => args.extend(["-t".to_string(), name.to_string()]),
            None => args.push(format!("--pdf-engine={}", self.pdf_engine)),
        }

        args.extend([
            "-o".to_string(),
            request.artifact_path(None).to_string_lossy().to_string(),
            "--standalone".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Backend for MarkupBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Markup
    }

    async fn detect(&self, locator: &ToolLocator) -> BackendStatus {
        locator
            .detect_tool(BackendKind::Markup, &["pandoc"], &["--version"])
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
            .ok_or_else(|| BackendError::unavailable(BackendKind::Markup, "no executable path"))?;

        let args = self.build_args(request);
        let output = run_tool(
            BackendKind::Markup,
            program,
            &args,
            self.timeout_secs,
            &request.cancel,
        )
        .await?;

        let target = request.artifact_path(None);
        if !target.is_file() {
            return Err(BackendError::NoOutput {
                expected: target,
                diagnostics: super::error::diagnostics_tail(&output.combined()),
            });
        }

        report_progress(&progress, 1.0);
        Ok(RawResult::single(target, request.output.clone()))
    }
}
