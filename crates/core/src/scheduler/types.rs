//! Jobs, batches and the events they emit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backend::BackendError;
use crate::capability::{BackendKind, Format};
use crate::selector::SelectorError;
use crate::settings::Settings;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Allowed moves. Queued jobs may also fail or be cancelled before they
    /// ever run.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    BackendUnavailable,
    InvalidRange,
    ConversionFailed,
    PostProcessingFailed,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    /// Tail of the tool's output, when there was a tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: None,
        }
    }

    pub fn invalid_range(err: &SelectorError) -> Self {
        Self::new(JobErrorKind::InvalidRange, err.to_string())
    }

    /// Maps an adapter failure. Cancellation is not an error and is handled
    /// by the caller.
    pub fn from_backend(err: &BackendError) -> Self {
        let kind = match err {
            BackendError::Unavailable { .. } => JobErrorKind::BackendUnavailable,
            BackendError::PageOutOfRange(_) => JobErrorKind::InvalidRange,
            _ => JobErrorKind::ConversionFailed,
        };
        Self {
            kind,
            message: err.to_string(),
            diagnostics: err.diagnostics().map(String::from),
        }
    }
}

/// One unit of work: one source to one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source: PathBuf,
    pub input: Format,
    pub output: Format,
    pub backend: BackendKind,
    /// Reserved destination. Paged output lands in `<stem>_page_<n>` siblings.
    pub destination: PathBuf,
    pub state: JobState,
    /// 0.0 to 1.0.
    pub progress: f32,
    /// Page or frame indices actually converted, in output order.
    #[serde(default)]
    pub selected_indices: Vec<u32>,
    /// Final files written.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    /// Stages that were requested but did not apply to this job's output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-job notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub batch_id: String,
    pub job_id: String,
    pub state: JobState,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobEvent {
    pub fn from_job(batch_id: &str, job: &Job) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            job_id: job.id.clone(),
            state: job.state,
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Succeeded,
    CompletedWithFailures,
    Cancelled,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Event stream of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Job(JobEvent),
    /// Aggregate progress: `(completed + partial progress of running) / total`.
    Progress {
        completed: usize,
        total: usize,
        fraction: f32,
    },
    Finished {
        outcome: BatchOutcome,
    },
}

/// A caller's request to convert sources.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub sources: Vec<PathBuf>,
    pub output_format: Format,
    /// Snapshot of settings taken at submission.
    pub settings: Settings,
    /// Overrides today's date for `{date}`.
    pub date: Option<NaiveDate>,
}

impl BatchRequest {
    pub fn new(sources: Vec<PathBuf>, output_format: Format, settings: Settings) -> Self {
        Self {
            sources,
            output_format,
            settings,
            date: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// State of a batch and all of its jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub output_format: Format,
    pub date: NaiveDate,
    pub jobs: Vec<Job>,
    /// Set once every job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BatchOutcome>,
    /// Zip holding the outputs when archiving succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn completed(&self) -> usize {
        self.jobs.iter().filter(|j| j.state.is_terminal()).count()
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    /// Aggregate progress in `0.0..=1.0`.
    pub fn fraction(&self) -> f32 {
        if self.jobs.is_empty() {
            return 1.0;
        }
        let partial: f32 = self
            .jobs
            .iter()
            .filter(|j| j.state == JobState::Running)
            .map(|j| j.progress)
            .sum();
        ((self.completed() as f32 + partial) / self.total() as f32).clamp(0.0, 1.0)
    }

    pub fn progress_event(&self) -> BatchEvent {
        BatchEvent::Progress {
            completed: self.completed(),
            total: self.total(),
            fraction: self.fraction(),
        }
    }

    /// Outcome implied by the job states.
    pub(crate) fn derive_outcome(&self, cancelled: bool) -> BatchOutcome {
        if cancelled && self.count(JobState::Cancelled) > 0 {
            BatchOutcome::Cancelled
        } else if self.count(JobState::Failed) > 0 || self.count(JobState::Cancelled) > 0 {
            BatchOutcome::CompletedWithFailures
        } else {
            BatchOutcome::Succeeded
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Coarse lifecycle of a batch handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchHandleState {
    Running,
    /// Cancel requested, jobs still settling.
    Cancelling,
    Finished,
}

/// Status of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Maximum concurrent jobs.
    pub workers: usize,
    /// Jobs currently running.
    pub active_jobs: u64,
    /// Jobs waiting for a worker.
    pub queued_jobs: u64,
    /// Jobs finished since startup.
    pub total_processed: u64,
    /// Jobs failed since startup.
    pub total_failed: u64,
    /// Batches not yet finished.
    pub active_batches: usize,
}
