//! Backend adapters over external conversion tools.
//!
//! Each [`Backend`] variant locates its tool, probes availability and turns
//! a [`ConversionRequest`] into raw artifacts inside a staging directory.
//! [`BackendDirectory`] owns the adapters and caches their status.

mod directory;
mod error;
mod ffmpeg;
mod image_codec;
mod locator;
mod markup;
mod office;
mod poppler;
mod presentation;
mod process;
mod traits;
mod types;

use std::sync::Arc;

pub use directory::BackendDirectory;
pub use error::BackendError;
pub use ffmpeg::FfmpegBackend;
pub use image_codec::ImageCodecBackend;
pub use locator::{probe_version, ToolLocator};
pub use markup::MarkupBackend;
pub use office::OfficeBackend;
pub use poppler::PdfRasterBackend;
pub use presentation::PresentationBackend;
pub use process::{run_tool, ToolOutput};
pub use traits::Backend;
pub use types::{
    report_progress, BackendStatus, ConversionRequest, LocationSource, ProgressSender,
    RawArtifact, RawResult,
};

pub(crate) use image_codec::{image_format, save_raster};

/// One adapter per backend kind.
pub fn default_backends(timeout_secs: u64) -> Vec<Arc<dyn Backend>> {
    vec![
        Arc::new(ImageCodecBackend::new()),
        Arc::new(OfficeBackend::new(timeout_secs)),
        Arc::new(MarkupBackend::new(timeout_secs)),
        Arc::new(PdfRasterBackend::new(timeout_secs)),
        Arc::new(PresentationBackend::new(timeout_secs)),
        Arc::new(FfmpegBackend::new(timeout_secs)),
    ]
}
