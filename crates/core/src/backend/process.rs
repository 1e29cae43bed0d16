//! Running external tools with timeout and cancellation.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::BackendError;
use crate::capability::BackendKind;

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Both streams, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs `program args..` to completion.
///
/// The child is killed when the timeout elapses or `cancel` fires.
pub async fn run_tool(
    kind: BackendKind,
    program: &Path,
    args: &[String],
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<ToolOutput, BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }

    debug!(backend = %kind, program = %program.display(), ?args, "Running tool");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(kind, program, e))?;

    let output = tokio::select! {
        result = timeout(Duration::from_secs(timeout_secs), child.wait_with_output()) => {
            match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(BackendError::Io(e)),
                Err(_) => return Err(BackendError::Timeout { timeout_secs }),
            }
        }
        _ = cancel.cancelled() => return Err(BackendError::Cancelled),
    };

    let captured = ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if !output.status.success() {
        return Err(BackendError::tool_failed(
            tool_name(program),
            output.status.code(),
            &captured.combined(),
        ));
    }

    Ok(captured)
}

/// Maps a spawn failure; a missing binary means the backend is unavailable.
pub(crate) fn spawn_error(kind: BackendKind, program: &Path, e: std::io::Error) -> BackendError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BackendError::unavailable(kind, format!("{} not found", program.display()))
    } else {
        BackendError::Io(e)
    }
}

pub(crate) fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}
