//! Post-processing applied to a job's raw artifacts.
//!
//! Stages run in a fixed order: watermark, then container assembly. Archive
//! packaging runs once per batch after every job is terminal, and source
//! deletion right after a job succeeds; both are driven by the scheduler.

mod archive;
mod assembly;
mod watermark;

use std::path::Path;
use thiserror::Error;

pub use archive::create_archive;
pub use assembly::{assemble, needs_assembly, write_gif, write_pdf, write_tiff};
pub use watermark::{load_font, overlay};

use crate::backend::{RawArtifact, RawResult};
use crate::capability::Format;
use crate::settings::{ConversionOptions, WatermarkConfig};

/// Errors from post-processing stages.
#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("Watermark failed: {0}")]
    Watermark(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PostProcessError {
    /// Stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Watermark(_) => "watermark",
            Self::Assembly(_) => "assembly",
            Self::Archive(_) => "archive",
            Self::Io(_) => "io",
        }
    }
}

/// What to do with one job's raw output.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessPlan<'a> {
    pub target: &'a Format,
    pub options: &'a ConversionOptions,
    pub watermark: &'a WatermarkConfig,
    pub staging_dir: &'a Path,
    pub stem: &'a str,
}

/// Runs the per-job stages and returns the finished artifacts, still in
/// staging.
///
/// Blocking; call from a blocking thread.
pub fn process(
    raw: RawResult,
    plan: PostProcessPlan<'_>,
) -> Result<Vec<RawArtifact>, PostProcessError> {
    let artifacts = raw.artifacts;

    if plan.watermark.is_active() {
        watermark::apply(&artifacts, plan.watermark, plan.options.quality)?;
    }

    if !needs_assembly(plan.target, &artifacts) {
        return Ok(artifacts);
    }

    let out = plan
        .staging_dir
        .join(format!("{}.{}", plan.stem, plan.target.extension()));
    assemble(&artifacts, plan.target, plan.options, &out)?;
    for artifact in &artifacts {
        if artifact.path != out {
            let _ = std::fs::remove_file(&artifact.path);
        }
    }

    Ok(vec![RawArtifact {
        path: out,
        format: plan.target.clone(),
        index: None,
    }])
}
