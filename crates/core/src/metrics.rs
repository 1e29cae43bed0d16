//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler (batches, jobs, durations)
//! - Backends (detection results)
//! - Post-processing (failures by stage)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Scheduler - Batch Metrics
// =============================================================================

/// Batches accepted by the scheduler.
pub static BATCHES_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_batches_submitted_total", "Total batches submitted"),
        &["output_format"],
    )
    .unwrap()
});

/// Finished batches by outcome.
pub static BATCHES_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_batches_completed_total", "Total batches finished"),
        &["outcome"], // "succeeded", "completed_with_failures", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Scheduler - Job Metrics
// =============================================================================

/// Jobs reaching a terminal state.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_jobs_total", "Total jobs by terminal state"),
        &["state", "backend"], // state: "succeeded", "failed", "cancelled"
    )
    .unwrap()
});

/// Wall time from Running to a terminal state.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("convertino_job_duration_seconds", "Duration of running jobs")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["backend"],
    )
    .unwrap()
});

/// Jobs currently in Running state across all batches.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_jobs_running", "Jobs currently running").unwrap()
});

// =============================================================================
// Backends
// =============================================================================

/// Backend detection probes by result.
pub static BACKEND_DETECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_backend_detections_total", "Total backend detection probes"),
        &["backend", "result"], // result: "available", "unavailable"
    )
    .unwrap()
});

// =============================================================================
// Post-processing
// =============================================================================

/// Post-processing failures by stage.
pub static POSTPROCESS_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_postprocess_failures_total",
            "Total post-processing failures",
        ),
        &["stage"], // "watermark", "assembly", "placement", "archive", "delete_source"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Batches
        Box::new(BATCHES_SUBMITTED.clone()),
        Box::new(BATCHES_COMPLETED.clone()),
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOBS_RUNNING.clone()),
        // Backends
        Box::new(BACKEND_DETECTIONS.clone()),
        // Post-processing
        Box::new(POSTPROCESS_FAILURES.clone()),
    ]
}
