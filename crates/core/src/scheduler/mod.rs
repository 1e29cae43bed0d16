//! Batch scheduling: destinations fixed up front, jobs run on a bounded
//! worker pool, events streamed to subscribers.

mod config;
mod error;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use error::SubmitError;
pub use runner::{BatchHandle, Scheduler};
pub use types::{
    BatchEvent, BatchHandleState, BatchOutcome, BatchReport, BatchRequest, Job, JobError,
    JobErrorKind, JobEvent, JobState, PoolStatus,
};
