//! Slide rendering: office export to PDF, then rasterize each slide.

use async_trait::async_trait;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::office::{export_with_office, OFFICE_NAMES};
use super::poppler::{rasterize_pdf, PopplerTools};
use super::traits::Backend;
use super::types::{report_progress, BackendStatus, ConversionRequest, ProgressSender, RawResult};
use crate::capability::BackendKind;

/// Share of progress attributed to the PDF export.
const EXPORT_SHARE: f32 = 0.3;

pub struct PresentationBackend {
    timeout_secs: u64,
}

impl PresentationBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Backend for PresentationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Presentation
    }

    /// Needs soffice plus pdftoppm and pdfinfo.
    async fn detect(&self, locator: &ToolLocator) -> BackendStatus {
        let mut status = locator
            .detect_tool(BackendKind::Presentation, OFFICE_NAMES, &["--version"])
            .await;
        if !status.available {
            return status;
        }

        let Some((pdftoppm, _)) = locator.locate(BackendKind::PdfRaster, &["pdftoppm"]) else {
            return status.missing_companion("pdftoppm");
        };
        let Some(pdfinfo) = locator.companion(&pdftoppm, "pdfinfo") else {
            return status.missing_companion("pdfinfo");
        };
        status.companions.insert("pdftoppm".to_string(), pdftoppm);
        status.companions.insert("pdfinfo".to_string(), pdfinfo);
        status
    }

    async fn convert(
        &self,
        status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let kind = BackendKind::Presentation;
        let soffice = status
            .path
            .as_deref()
            .ok_or_else(|| BackendError::unavailable(kind, "no executable path"))?;
        let (Some(pdftoppm), Some(pdfinfo)) =
            (status.companion("pdftoppm"), status.companion("pdfinfo"))
        else {
            return Err(BackendError::unavailable(kind, "poppler tools not found"));
        };

        let pdf = export_with_office(
            kind,
            soffice,
            &request.source,
            &request.staging_dir,
            ".slides",
            "pdf",
            self.timeout_secs,
            &request.cancel,
        )
        .await?;
        report_progress(&progress, EXPORT_SHARE);

        if request.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let result = rasterize_pdf(
            kind,
            PopplerTools { pdftoppm, pdfinfo },
            &pdf,
            request,
            &progress,
            (EXPORT_SHARE, 1.0),
            self.timeout_secs,
        )
        .await;

        let _ = tokio::fs::remove_file(&pdf).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocationSource;

    fn touch(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[tokio::test]
    async fn test_detect_uses_configured_office_and_poppler_paths() {
        let dir = tempfile::tempdir().unwrap();
        let soffice = touch(dir.path(), "custom-soffice");
        let pdftoppm = touch(dir.path(), "pdftoppm");
        let pdfinfo = touch(dir.path(), "pdfinfo");

        let locator = ToolLocator::new()
            .with_override(BackendKind::Office, soffice.clone())
            .with_override(BackendKind::PdfRaster, pdftoppm.clone());
        let status = PresentationBackend::new(10).detect(&locator).await;

        assert!(status.available, "{:?}", status.error);
        assert_eq!(status.path, Some(soffice));
        assert_eq!(status.source, Some(LocationSource::Override));
        assert_eq!(status.companion("pdftoppm"), Some(&pdftoppm));
        assert_eq!(status.companion("pdfinfo"), Some(&pdfinfo));
    }
}
