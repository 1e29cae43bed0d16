//! Error types for backend adapters.

use std::path::PathBuf;
use thiserror::Error;

use crate::capability::{BackendKind, Format};
use crate::selector::SelectorError;

/// Longest diagnostic tail kept from a tool's output.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Errors that can occur while detecting or running a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The tool could not be located or does not start.
    #[error("Backend {kind} unavailable: {reason}")]
    Unavailable { kind: BackendKind, reason: String },

    /// The tool exited with a non-success status.
    #[error("{tool} failed with exit code {code:?}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        diagnostics: Option<String>,
    },

    /// The tool reported success but the expected artifact is missing.
    #[error("Expected output not produced: {expected}")]
    NoOutput {
        expected: PathBuf,
        diagnostics: Option<String>,
    },

    /// The backend cannot perform this pair.
    #[error("Backend does not handle {input} -> {output}")]
    Unsupported { input: Format, output: Format },

    /// A selected page or frame lies outside the source.
    #[error(transparent)]
    PageOutOfRange(#[from] SelectorError),

    /// Decoding or encoding in the native codec failed.
    #[error("Codec error: {reason}")]
    Codec { reason: String },

    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn unavailable(kind: BackendKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            kind,
            reason: reason.into(),
        }
    }

    pub fn tool_failed(tool: impl Into<String>, code: Option<i32>, output: &str) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            code,
            diagnostics: diagnostics_tail(output),
        }
    }

    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    /// Captured tool output attached to the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { diagnostics, .. } | Self::NoOutput { diagnostics, .. } => {
                diagnostics.as_deref()
            }
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}

impl From<image::ImageError> for BackendError {
    fn from(e: image::ImageError) -> Self {
        Self::codec(e.to_string())
    }
}

/// Keeps the end of a tool's output, where the actual error usually is.
pub(crate) fn diagnostics_tail(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let count = trimmed.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        return Some(trimmed.to_string());
    }
    Some(trimmed.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect())
}
