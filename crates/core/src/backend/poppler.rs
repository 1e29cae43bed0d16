//! Poppler backend rasterizing PDF pages.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::{Path, PathBuf};

use super::error::BackendError;
use super::locator::ToolLocator;
use super::process::run_tool;
use super::traits::Backend;
use super::types::{
    report_progress, BackendStatus, ConversionRequest, ProgressSender, RawArtifact, RawResult,
};
use crate::capability::BackendKind;

/// Reads `Pages:` from pdfinfo output.
pub(crate) fn parse_page_count(info: &str) -> Option<u32> {
    let re = Regex::new(r"(?m)^Pages:\s+(\d+)").ok()?;
    re.captures(info)?.get(1)?.as_str().parse().ok()
}

/// Raster flags for one output format. Returns the flags and the extension
/// pdftoppm appends.
fn raster_flags(extension: &str, quality: u8) -> Option<(Vec<String>, &'static str)> {
    match extension {
        "png" => Some((vec!["-png".to_string()], "png")),
        "jpg" => Some((
            vec![
                "-jpeg".to_string(),
                "-jpegopt".to_string(),
                format!("quality={}", quality),
            ],
            "jpg",
        )),
        "tiff" => Some((vec!["-tiff".to_string()], "tif")),
        _ => None,
    }
}

/// Paths to the poppler tools used for rasterizing.
pub(crate) struct PopplerTools<'a> {
    pub pdftoppm: &'a Path,
    pub pdfinfo: &'a Path,
}

/// Rasterizes the selected pages of `pdf` into the request's staging dir.
///
/// Progress is reported linearly within `span`. Cancellation is checked
/// between pages.
pub(crate) async fn rasterize_pdf(
    kind: BackendKind,
    tools: PopplerTools<'_>,
    pdf: &Path,
    request: &ConversionRequest,
    progress: &ProgressSender,
    span: (f32, f32),
    timeout_secs: u64,
) -> Result<RawResult, BackendError> {
    let info = run_tool(
        kind,
        tools.pdfinfo,
        &[pdf.to_string_lossy().to_string()],
        timeout_secs,
        &request.cancel,
    )
    .await?;
    let page_count = parse_page_count(&info.stdout)
        .ok_or_else(|| BackendError::codec("pdfinfo did not report a page count"))?;

    let pages = request.selection.resolve(page_count)?;
    let (flags, produced_ext) = raster_flags(request.output.extension(), request.options.quality)
        .ok_or_else(|| BackendError::Unsupported {
            input: request.input.clone(),
            output: request.output.clone(),
        })?;

    let options = &request.options;
    let mut artifacts = Vec::with_capacity(pages.len());

    for (done, page) in pages.iter().enumerate() {
        if request.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let target = request.artifact_path(Some(*page));
        let prefix = target.with_extension("");

        let mut args = vec![
            "-f".to_string(),
            page.to_string(),
            "-l".to_string(),
            page.to_string(),
            "-r".to_string(),
            options.dpi.to_string(),
        ];
        args.extend(flags.iter().cloned());
        if let Some(width) = options.width {
            args.extend([
                "-scale-to-x".to_string(),
                width.to_string(),
                "-scale-to-y".to_string(),
                options.height.map(|h| h.to_string()).unwrap_or("-1".into()),
            ]);
        } else if let Some(height) = options.height {
            args.extend([
                "-scale-to-x".to_string(),
                "-1".to_string(),
                "-scale-to-y".to_string(),
                height.to_string(),
            ]);
        }
        args.extend([
            "-singlefile".to_string(),
            pdf.to_string_lossy().to_string(),
            prefix.to_string_lossy().to_string(),
        ]);

        run_tool(kind, tools.pdftoppm, &args, timeout_secs, &request.cancel).await?;

        let produced = PathBuf::from(format!("{}.{}", prefix.to_string_lossy(), produced_ext));
        if !produced.is_file() {
            return Err(BackendError::NoOutput {
                expected: produced,
                diagnostics: None,
            });
        }
        if produced != target {
            tokio::fs::rename(&produced, &target).await?;
        }

        artifacts.push(RawArtifact {
            path: target,
            format: request.output.clone(),
            index: Some(*page),
        });

        let fraction = (done + 1) as f32 / pages.len() as f32;
        report_progress(progress, span.0 + (span.1 - span.0) * fraction);
    }

    Ok(RawResult { artifacts })
}

/// PDF page rasterizer via pdftoppm.
pub struct PdfRasterBackend {
    timeout_secs: u64,
}

impl PdfRasterBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Backend for PdfRasterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PdfRaster
    }

    async fn detect(&self, locator: &ToolLocator) -> BackendStatus {
        let mut status = locator
            .detect_tool(BackendKind::PdfRaster, &["pdftoppm"], &["-v"])
            .await;
        if let Some(primary) = status.path.clone() {
            match locator.companion(&primary, "pdfinfo") {
                Some(pdfinfo) => {
                    status.companions.insert("pdfinfo".to_string(), pdfinfo);
                }
                None => status = status.missing_companion("pdfinfo"),
            }
        }
        status
    }

    async fn convert(
        &self,
        status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let pdftoppm = status.path.as_deref().ok_or_else(|| {
            BackendError::unavailable(BackendKind::PdfRaster, "no executable path")
        })?;
        let pdfinfo = status
            .companion("pdfinfo")
            .ok_or_else(|| BackendError::unavailable(BackendKind::PdfRaster, "pdfinfo not found"))?;

        rasterize_pdf(
            BackendKind::PdfRaster,
            PopplerTools { pdftoppm, pdfinfo },
            &request.source,
            request,
            &progress,
            (0.0, 1.0),
            self.timeout_secs,
        )
        .await
    }
}
