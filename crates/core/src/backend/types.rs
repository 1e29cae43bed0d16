//! Request and result types shared by all backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capability::{BackendKind, Format};
use crate::selector::PageSelection;
use crate::settings::ConversionOptions;

/// Channel on which backends report progress as a fraction in `0.0..=1.0`.
pub type ProgressSender = mpsc::Sender<f32>;

/// Sends a progress update without waiting; dropped updates are fine.
pub fn report_progress(tx: &ProgressSender, fraction: f32) {
    let _ = tx.try_send(fraction.clamp(0.0, 1.0));
}

/// A normalized request handed to a backend.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: String,
    pub source: PathBuf,
    pub input: Format,
    /// Format the backend must write. May be an intermediate raster when the
    /// job's target is a multi-page container.
    pub output: Format,
    /// Directory the backend writes into. Nothing is written elsewhere.
    pub staging_dir: PathBuf,
    /// File stem for artifacts inside the staging directory.
    pub stem: String,
    pub options: ConversionOptions,
    pub selection: PageSelection,
    pub cancel: CancellationToken,
}

impl ConversionRequest {
    /// Staging path for an artifact; `index` is set for per-page output.
    pub fn artifact_path(&self, index: Option<u32>) -> PathBuf {
        let name = match index {
            Some(i) => format!("{}_page_{}.{}", self.stem, i, self.output.extension()),
            None => format!("{}.{}", self.stem, self.output.extension()),
        };
        self.staging_dir.join(name)
    }
}

/// A file produced directly by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArtifact {
    pub path: PathBuf,
    pub format: Format,
    /// 1-based page or frame index, when the artifact is one of several.
    pub index: Option<u32>,
}

/// Everything a backend produced for one request, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    pub artifacts: Vec<RawArtifact>,
}

impl RawResult {
    pub fn single(path: PathBuf, format: Format) -> Self {
        Self {
            artifacts: vec![RawArtifact {
                path,
                format,
                index: None,
            }],
        }
    }
}

/// How a backend executable was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Path configured by the user.
    Override,
    /// Shipped alongside the application.
    Bundled,
    /// Well-known install location.
    Conventional,
    /// Found on `PATH`.
    SystemPath,
    /// Compiled into the engine.
    Builtin,
}

/// Result of probing a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub kind: BackendKind,
    pub available: bool,
    pub path: Option<PathBuf>,
    pub source: Option<LocationSource>,
    /// First line of the version probe, truncated.
    pub version: Option<String>,
    /// Helper executables, by name.
    #[serde(default)]
    pub companions: BTreeMap<String, PathBuf>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl BackendStatus {
    pub fn unavailable(kind: BackendKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            available: false,
            path: None,
            source: None,
            version: None,
            companions: BTreeMap::new(),
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn builtin(kind: BackendKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            available: true,
            path: None,
            source: Some(LocationSource::Builtin),
            version: Some(version.into()),
            companions: BTreeMap::new(),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Marks the status unavailable because a helper is missing.
    pub fn missing_companion(mut self, name: &str) -> Self {
        self.available = false;
        self.error = Some(format!("{} not found", name));
        self
    }

    pub fn companion(&self, name: &str) -> Option<&PathBuf> {
        self.companions.get(name)
    }
}
