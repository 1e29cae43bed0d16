//! Testing utilities and mock implementations.
//!
//! Provides a controllable [`MockBackend`] so the scheduler and the HTTP
//! surface can be exercised without external tools installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::MockBackend;
//!
//! let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec));
//! let directory = BackendDirectory::new(vec![backend.clone()], ToolLocator::new());
//! ```

mod mock_backend;

pub use mock_backend::MockBackend;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use tokio_util::sync::CancellationToken;

    use crate::backend::ConversionRequest;
    use crate::capability::Format;
    use crate::selector::PageSelection;
    use crate::settings::ConversionOptions;

    /// Create a conversion request with default options staged under the
    /// system temp directory.
    pub fn request(source: &str, input: &str, output: &str) -> ConversionRequest {
        let source = PathBuf::from(source);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        ConversionRequest {
            job_id: "job-test".to_string(),
            source,
            input: Format::new(input),
            output: Format::new(output),
            staging_dir: std::env::temp_dir().join("convertino-test"),
            stem,
            options: ConversionOptions::default(),
            selection: PageSelection::all(),
            cancel: CancellationToken::new(),
        }
    }

    /// Write a small solid-colour PNG.
    pub fn write_png(path: &Path, width: u32, height: u32) -> image::ImageResult<()> {
        image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90])).save(path)
    }
}
