//! Mock backend for testing.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{
    report_progress, Backend, BackendError, BackendStatus, ConversionRequest, ProgressSender,
    RawArtifact, RawResult, ToolLocator,
};
use crate::capability::BackendKind;

/// Mock implementation of the Backend trait.
///
/// Provides controllable behavior for testing:
/// - Availability and detection counting
/// - Simulated conversion duration, split into progress steps
/// - Forced failure for chosen source file names
/// - Page-indexed output for a fixed page count
/// - High-water mark of concurrent conversions
///
/// Raster outputs are small real images so post-processing can run on them.
///
/// # Example
///
/// ```rust,ignore
/// use convertino_core::testing::MockBackend;
///
/// let backend = MockBackend::new(BackendKind::PdfRaster)
///     .with_pages(5)
///     .with_duration(Duration::from_millis(50))
///     .failing_on("broken.pdf");
/// ```
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    available: bool,
    duration: Duration,
    steps: u32,
    pages: Option<u32>,
    failing: HashSet<String>,
    requests: Arc<RwLock<Vec<ConversionRequest>>>,
    detections: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockBackend {
    /// Create an available mock backend that converts instantly.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            available: true,
            duration: Duration::ZERO,
            steps: 4,
            pages: None,
            failing: HashSet::new(),
            requests: Arc::new(RwLock::new(Vec::new())),
            detections: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Report the backend as not installed.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Spend `duration` in each conversion.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Treat every source as having `pages` pages and emit one artifact per
    /// selected page.
    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = Some(pages);
        self
    }

    /// Fail conversions of sources with this file name.
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    /// Number of times detection ran.
    pub async fn detect_count(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    pub async fn recorded_requests(&self) -> Vec<ConversionRequest> {
        self.requests.read().await.clone()
    }

    /// Most conversions ever in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn write_artifact(
        &self,
        request: &ConversionRequest,
        index: Option<u32>,
    ) -> Result<RawArtifact, BackendError> {
        std::fs::create_dir_all(&request.staging_dir)?;
        let path = request.artifact_path(index);

        match crate::backend::image_format(&request.output) {
            Some(_) => {
                let shade = (index.unwrap_or(1) * 40 % 255) as u8;
                let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    64,
                    48,
                    Rgb([shade, 120, 200]),
                ));
                crate::backend::save_raster(
                    &img,
                    &path,
                    &request.output,
                    request.options.quality,
                )?;
            }
            None => std::fs::write(&path, format!("mock {} output", request.output))?,
        }

        Ok(RawArtifact {
            path,
            format: request.output.clone(),
            index,
        })
    }
}

/// Decrements the running counter on every exit path.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn detect(&self, _locator: &ToolLocator) -> BackendStatus {
        self.detections.fetch_add(1, Ordering::SeqCst);
        if self.available {
            BackendStatus::builtin(self.kind, "mock")
        } else {
            BackendStatus::unavailable(self.kind, "mock backend not installed")
        }
    }

    async fn convert(
        &self,
        _status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        self.requests.write().await.push(request.clone());

        let step = self.duration / self.steps.max(1);
        for i in 1..=self.steps {
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = request.cancel.cancelled() => return Err(BackendError::Cancelled),
            }
            report_progress(&progress, i as f32 / self.steps as f32);
        }

        let file_name = request
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&file_name) {
            return Err(BackendError::tool_failed("mock", Some(1), "forced failure"));
        }

        let artifacts = match self.pages {
            Some(pages) => request
                .selection
                .resolve(pages)?
                .into_iter()
                .map(|i| self.write_artifact(request, Some(i)))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![self.write_artifact(request, None)?],
        };

        Ok(RawResult { artifacts })
    }
}
