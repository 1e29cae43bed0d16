//! The batch scheduler.

use chrono::{Local, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SchedulerConfig;
use super::error::SubmitError;
use super::types::{
    BatchEvent, BatchHandleState, BatchReport, BatchRequest, Job, JobError, JobErrorKind,
    JobEvent, JobState, PoolStatus,
};
use crate::backend::{BackendDirectory, BackendError, ConversionRequest, RawArtifact};
use crate::capability::{BackendKind, CapabilityRegistry, Format};
use crate::metrics::{
    BATCHES_COMPLETED, BATCHES_SUBMITTED, JOBS_RUNNING, JOBS_TOTAL, JOB_DURATION,
    POSTPROCESS_FAILURES,
};
use crate::naming::{
    expand_pattern, page_destination, DestinationResolver, OutputLayout, OutputTemplate,
    TemplateContext,
};
use crate::postprocess::{self, create_archive, PostProcessPlan};
use crate::selector::PageSelection;
use crate::settings::{ConversionOptions, Settings};

/// Share of a job's progress covered by the backend.
const CONVERT_SHARE: f32 = 0.9;

/// Raw format for paged backends feeding a container target.
const INTERMEDIATE_FORMAT: &str = "png";

/// Archive name template, expanded with the batch date.
const ARCHIVE_PATTERN: &str = "convertino_{date}";

/// Pool statistics tracked atomically.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

/// Shared between the scheduler and every batch driver.
struct Engine {
    directory: Arc<BackendDirectory>,
    semaphore: Arc<Semaphore>,
    stats: PoolStats,
    job_timeout: Duration,
}

/// Fixed per-job inputs computed during the pre-pass.
struct JobPlan {
    backend: BackendKind,
    /// What the backend writes; differs from the target for assembled jobs.
    raw_format: Format,
    stem: String,
    /// Failure known before dispatch; the job never runs.
    preflight: Option<JobError>,
}

struct BatchShared {
    id: String,
    settings: Settings,
    options: ConversionOptions,
    selection: PageSelection,
    staging_dir: PathBuf,
    archive_path: Option<PathBuf>,
    plans: Vec<JobPlan>,
    report: RwLock<BatchReport>,
    events: broadcast::Sender<BatchEvent>,
    /// Receiver created at submission so the first subscriber misses nothing.
    first_subscriber: std::sync::Mutex<Option<broadcast::Receiver<BatchEvent>>>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

impl BatchShared {
    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Applies `f` to job `index` and publishes the result.
    async fn update_job<F>(&self, index: usize, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job) -> bool,
    {
        let (job, progress) = {
            let mut report = self.report.write().await;
            let job = report.jobs.get_mut(index)?;
            if !f(job) {
                return None;
            }
            let job = job.clone();
            (job, report.progress_event())
        };
        self.emit(BatchEvent::Job(JobEvent::from_job(&self.id, &job)));
        self.emit(progress);
        Some(job)
    }

    async fn transition(&self, index: usize, next: JobState, error: Option<JobError>) -> Option<Job> {
        self.update_job(index, |job| {
            if !job.state.can_transition_to(next) {
                warn!(job_id = %job.id, from = %job.state, to = %next, "Ignoring invalid transition");
                return false;
            }
            job.state = next;
            match next {
                JobState::Running => {
                    job.progress = 0.0;
                    job.started_at = Some(Utc::now());
                }
                JobState::Succeeded => {
                    job.progress = 1.0;
                    job.finished_at = Some(Utc::now());
                }
                _ => job.finished_at = Some(Utc::now()),
            }
            job.error = error;
            true
        })
        .await
    }

    async fn set_progress(&self, index: usize, fraction: f32) {
        self.update_job(index, |job| {
            if job.state != JobState::Running || fraction <= job.progress {
                return false;
            }
            job.progress = fraction.min(1.0);
            true
        })
        .await;
    }
}

/// Caller's handle on a submitted batch. Cheap to clone.
#[derive(Clone)]
pub struct BatchHandle {
    shared: Arc<BatchShared>,
}

impl BatchHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Requests cancellation. Running jobs stop their tools; queued jobs are
    /// never started.
    pub fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!(batch_id = %self.shared.id, "Cancelling batch");
            self.shared.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Event stream of the batch.
    ///
    /// The first subscriber receives every event since submission; later
    /// subscribers see events from the moment they subscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        let mut first = self
            .shared
            .first_subscriber
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        first.take().unwrap_or_else(|| self.shared.events.subscribe())
    }

    /// Current state of every job.
    pub async fn snapshot(&self) -> BatchReport {
        self.shared.report.read().await.clone()
    }

    pub fn state(&self) -> BatchHandleState {
        if *self.shared.done.borrow() {
            BatchHandleState::Finished
        } else if self.shared.cancel.is_cancelled() {
            BatchHandleState::Cancelling
        } else {
            BatchHandleState::Running
        }
    }

    /// Waits until every job is terminal and post-batch stages have run.
    pub async fn wait(&self) -> BatchReport {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, so this only fails if it is dropped.
        let _ = done.wait_for(|finished| *finished).await;
        self.snapshot().await
    }
}

/// Owns the worker pool and every submitted batch.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<CapabilityRegistry>,
    engine: Arc<Engine>,
    batches: RwLock<HashMap<String, BatchHandle>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<CapabilityRegistry>,
        directory: Arc<BackendDirectory>,
    ) -> Result<Self, SubmitError> {
        if config.workers == 0 {
            return Err(SubmitError::NoWorkers);
        }
        let engine = Arc::new(Engine {
            directory,
            semaphore: Arc::new(Semaphore::new(config.workers)),
            stats: PoolStats::default(),
            job_timeout: Duration::from_secs(config.job_timeout_secs.max(1)),
        });
        Ok(Self {
            config,
            registry,
            engine,
            batches: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<BackendDirectory> {
        &self.engine.directory
    }

    /// Validates a batch, reserves every destination and starts it.
    ///
    /// Only batch-fatal problems are returned here: no sources, an unknown
    /// source format, or a pair without a capability edge. Problems specific
    /// to one job are reported on that job.
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchHandle, SubmitError> {
        if request.sources.is_empty() {
            return Err(SubmitError::NoSources);
        }
        let output = request.output_format.clone();
        let confirmed = self.engine.directory.confirmed_available().await;

        // Every edge is resolved before any job exists.
        let mut edges = Vec::with_capacity(request.sources.len());
        for source in &request.sources {
            let input = Format::from_path(source).ok_or_else(|| SubmitError::UnknownFormat {
                path: source.clone(),
            })?;
            let edge = self.registry.resolve(&input, &output, &confirmed)?;
            edges.push((input, edge));
        }

        let settings = request.settings;
        let (selection, selection_error) =
            match PageSelection::parse(&settings.page_range, settings.reverse_pages) {
                Ok(selection) => (selection, None),
                Err(e) => {
                    warn!(error = %e, "Invalid page range, failing every job");
                    (PageSelection::all(), Some(JobError::invalid_range(&e)))
                }
            };

        // Date and destinations are fixed once, here, for the whole batch.
        let date = request.date.unwrap_or_else(|| Local::now().date_naive());
        let template = OutputTemplate::parse(&settings.output_pattern);
        let mut resolver = DestinationResolver::new();
        let batch_id = Uuid::new_v4().to_string();

        let mut jobs = Vec::with_capacity(edges.len());
        let mut plans = Vec::with_capacity(edges.len());
        for (source, (input, edge)) in request.sources.iter().zip(edges) {
            let stem = file_stem(source);
            let dir = output_dir(&settings, source);
            let expanded = template.expand(&TemplateContext::new(stem.clone(), date));
            let container = output.is_multi_frame_container();
            let layout = if edge.paged && !container {
                OutputLayout::Paged
            } else {
                OutputLayout::Single
            };

            let (destination, naming_error) =
                match resolver.resolve(&dir, &expanded, output.extension(), layout) {
                    Ok(path) => (path, None),
                    Err(e) => (
                        dir.join(format!("{}.{}", stem, output.extension())),
                        Some(JobError::new(JobErrorKind::ConversionFailed, e.to_string())),
                    ),
                };

            let raw_format = if edge.paged && container {
                Format::new(INTERMEDIATE_FORMAT)
            } else {
                output.clone()
            };

            jobs.push(Job {
                id: Uuid::new_v4().to_string(),
                source: source.clone(),
                input,
                output: output.clone(),
                backend: edge.backend,
                destination,
                state: JobState::Queued,
                progress: 0.0,
                selected_indices: Vec::new(),
                outputs: Vec::new(),
                warnings: Vec::new(),
                error: None,
                started_at: None,
                finished_at: None,
            });
            plans.push(JobPlan {
                backend: edge.backend,
                raw_format,
                stem,
                preflight: selection_error.clone().or(naming_error),
            });
        }

        let (archive_path, archive_error) = if settings.archive_outputs {
            let dir = output_dir(&settings, &request.sources[0]);
            let name = expand_pattern(ARCHIVE_PATTERN, &TemplateContext::new("", date));
            match resolver.resolve(&dir, &name, "zip", OutputLayout::Single) {
                Ok(path) => (Some(path), None),
                Err(e) => (None, Some(e.to_string())),
            }
        } else {
            (None, None)
        };

        let staging_dir = self.config.temp_dir.join(&batch_id);
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|source| SubmitError::Staging {
                path: staging_dir.clone(),
                source,
            })?;

        let job_count = jobs.len();
        let report = BatchReport {
            batch_id: batch_id.clone(),
            output_format: output.clone(),
            date,
            jobs,
            outcome: None,
            archive: None,
            archive_error,
            submitted_at: Utc::now(),
            finished_at: None,
        };

        let (events, first) = broadcast::channel(self.config.event_buffer.max(1));
        let (done, _) = watch::channel(false);
        let shared = Arc::new(BatchShared {
            id: batch_id.clone(),
            options: settings.options.normalized(),
            settings,
            selection,
            staging_dir,
            archive_path,
            plans,
            report: RwLock::new(report),
            events,
            first_subscriber: std::sync::Mutex::new(Some(first)),
            cancel: CancellationToken::new(),
            done,
        });

        let handle = BatchHandle {
            shared: shared.clone(),
        };
        self.batches
            .write()
            .await
            .insert(batch_id.clone(), handle.clone());

        self.engine
            .stats
            .queued
            .fetch_add(job_count as u64, Ordering::Relaxed);
        BATCHES_SUBMITTED.with_label_values(&[output.as_str()]).inc();
        info!(
            batch_id = %batch_id,
            jobs = job_count,
            output = %output,
            date = %date,
            "Batch submitted"
        );

        tokio::spawn(drive(self.engine.clone(), shared));
        Ok(handle)
    }

    /// Cancels a batch by id. Returns false for unknown ids.
    pub async fn cancel(&self, batch_id: &str) -> bool {
        match self.batches.read().await.get(batch_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn batch(&self, batch_id: &str) -> Option<BatchHandle> {
        self.batches.read().await.get(batch_id).cloned()
    }

    /// Snapshots of every known batch.
    pub async fn batches(&self) -> Vec<BatchReport> {
        let handles: Vec<_> = self.batches.read().await.values().cloned().collect();
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(handle.snapshot().await);
        }
        reports.sort_by_key(|r| r.submitted_at);
        reports
    }

    pub async fn status(&self) -> PoolStatus {
        let active_batches = self
            .batches
            .read()
            .await
            .values()
            .filter(|h| h.state() != BatchHandleState::Finished)
            .count();
        let stats = &self.engine.stats;
        PoolStatus {
            workers: self.config.workers,
            active_jobs: stats.active.load(Ordering::Relaxed),
            queued_jobs: stats.queued.load(Ordering::Relaxed),
            total_processed: stats.total_processed.load(Ordering::Relaxed),
            total_failed: stats.total_failed.load(Ordering::Relaxed),
            active_batches,
        }
    }

    /// Cancels every unfinished batch and waits for them to settle.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.batches.read().await.values().cloned().collect();
        for handle in &handles {
            handle.cancel();
        }
        for handle in handles {
            handle.wait().await;
        }
    }
}

/// Result of running one job.
enum Finish {
    Succeeded {
        outputs: Vec<PathBuf>,
        selected: Vec<u32>,
        warnings: Vec<String>,
    },
    Failed(JobError),
    Cancelled,
}

/// Dispatches a batch's jobs as workers free up, then runs batch-level
/// stages.
async fn drive(engine: Arc<Engine>, batch: Arc<BatchShared>) {
    let mut running = JoinSet::new();
    let mut task_jobs = HashMap::new();

    for index in 0..batch.plans.len() {
        if let Some(error) = batch.plans[index].preflight.clone() {
            engine.stats.queued.fetch_sub(1, Ordering::Relaxed);
            engine.stats.total_failed.fetch_add(1, Ordering::Relaxed);
            batch.transition(index, JobState::Failed, Some(error)).await;
            continue;
        }

        // Cancellation is checked before each job is started.
        let permit = tokio::select! {
            biased;
            _ = batch.cancel.cancelled() => break,
            permit = engine.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let handle = running.spawn(run_job(engine.clone(), batch.clone(), index, permit));
        task_jobs.insert(handle.id(), index);
    }

    while let Some(joined) = running.join_next_with_id().await {
        if let Err(e) = joined {
            error!(batch_id = %batch.id, error = %e, "Job task aborted");
            if let Some(&index) = task_jobs.get(&e.id()) {
                engine.stats.active.fetch_sub(1, Ordering::Relaxed);
                JOBS_RUNNING.dec();
                batch
                    .transition(
                        index,
                        JobState::Failed,
                        Some(JobError::new(JobErrorKind::ConversionFailed, "job task aborted")),
                    )
                    .await;
            }
        }
    }

    // Jobs never dispatched.
    let cancelled = batch.cancel.is_cancelled();
    for index in 0..batch.plans.len() {
        let queued = batch.report.read().await.jobs[index].state == JobState::Queued;
        if !queued {
            continue;
        }
        engine.stats.queued.fetch_sub(1, Ordering::Relaxed);
        if cancelled {
            batch.transition(index, JobState::Cancelled, None).await;
        } else {
            engine.stats.total_failed.fetch_add(1, Ordering::Relaxed);
            let error = JobError::new(JobErrorKind::ConversionFailed, "worker pool closed");
            batch.transition(index, JobState::Failed, Some(error)).await;
        }
    }

    archive_outputs(&batch).await;

    if let Err(e) = tokio::fs::remove_dir_all(&batch.staging_dir).await {
        debug!(path = %batch.staging_dir.display(), error = %e, "Staging cleanup skipped");
    }

    let outcome = {
        let mut report = batch.report.write().await;
        let outcome = report.derive_outcome(cancelled);
        report.outcome = Some(outcome);
        report.finished_at = Some(Utc::now());
        info!(
            batch_id = %batch.id,
            outcome = outcome.as_str(),
            succeeded = report.count(JobState::Succeeded),
            failed = report.count(JobState::Failed),
            cancelled = report.count(JobState::Cancelled),
            "Batch finished"
        );
        outcome
    };

    BATCHES_COMPLETED.with_label_values(&[outcome.as_str()]).inc();
    batch.emit(BatchEvent::Finished { outcome });
    batch.done.send_replace(true);
}

/// Runs one job on a held worker permit.
async fn run_job(
    engine: Arc<Engine>,
    batch: Arc<BatchShared>,
    index: usize,
    _permit: OwnedSemaphorePermit,
) {
    let stats = &engine.stats;
    stats.queued.fetch_sub(1, Ordering::Relaxed);
    stats.active.fetch_add(1, Ordering::Relaxed);
    JOBS_RUNNING.inc();
    let started = Instant::now();

    let Some(job) = batch.transition(index, JobState::Running, None).await else {
        stats.active.fetch_sub(1, Ordering::Relaxed);
        JOBS_RUNNING.dec();
        return;
    };
    let backend = batch.plans[index].backend;
    debug!(batch_id = %batch.id, job_id = %job.id, backend = %backend, "Job started");

    let finish = execute(&engine, &batch, index, &job).await;

    let (state, error) = match finish {
        Finish::Succeeded {
            outputs,
            selected,
            warnings,
        } => {
            batch
                .update_job(index, |j| {
                    j.outputs = outputs;
                    j.selected_indices = selected;
                    j.warnings = warnings;
                    true
                })
                .await;
            (JobState::Succeeded, None)
        }
        Finish::Failed(error) => (JobState::Failed, Some(error)),
        Finish::Cancelled => (JobState::Cancelled, None),
    };

    if let Some(error) = &error {
        warn!(
            batch_id = %batch.id,
            job_id = %job.id,
            kind = ?error.kind,
            error = %error.message,
            "Job failed"
        );
    }
    batch.transition(index, state, error).await;

    if state == JobState::Succeeded && batch.settings.delete_sources {
        delete_source(&job.source).await;
    }

    stats.active.fetch_sub(1, Ordering::Relaxed);
    stats.total_processed.fetch_add(1, Ordering::Relaxed);
    if state == JobState::Failed {
        stats.total_failed.fetch_add(1, Ordering::Relaxed);
    }
    JOBS_RUNNING.dec();
    JOBS_TOTAL
        .with_label_values(&[state.as_str(), backend.as_str()])
        .inc();
    JOB_DURATION
        .with_label_values(&[backend.as_str()])
        .observe(started.elapsed().as_secs_f64());
    info!(
        batch_id = %batch.id,
        job_id = %job.id,
        state = %state,
        duration_ms = started.elapsed().as_millis() as u64,
        "Job finished"
    );
}

/// Convert, post-process and place, inside a private staging directory.
async fn execute(engine: &Engine, batch: &BatchShared, index: usize, job: &Job) -> Finish {
    if batch.cancel.is_cancelled() {
        return Finish::Cancelled;
    }

    let staging = batch.staging_dir.join(&job.id);
    if let Err(e) = tokio::fs::create_dir_all(&staging).await {
        return Finish::Failed(JobError::new(
            JobErrorKind::ConversionFailed,
            format!("Failed to create staging directory: {}", e),
        ));
    }

    let finish = convert_and_place(engine, batch, index, job, &staging).await;

    // Raw and partial artifacts never outlive the job.
    let _ = tokio::fs::remove_dir_all(&staging).await;
    finish
}

async fn convert_and_place(
    engine: &Engine,
    batch: &BatchShared,
    index: usize,
    job: &Job,
    staging: &Path,
) -> Finish {
    let plan = &batch.plans[index];
    let request = ConversionRequest {
        job_id: job.id.clone(),
        source: job.source.clone(),
        input: job.input.clone(),
        output: plan.raw_format.clone(),
        staging_dir: staging.to_path_buf(),
        stem: plan.stem.clone(),
        options: batch.options.clone(),
        selection: batch.selection.clone(),
        cancel: batch.cancel.clone(),
    };

    let (progress_tx, mut progress_rx) = mpsc::channel(32);
    let convert = engine.directory.convert(plan.backend, &request, progress_tx);
    tokio::pin!(convert);
    let deadline = tokio::time::sleep(engine.job_timeout);
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            result = &mut convert => break result,
            Some(fraction) = progress_rx.recv() => {
                batch.set_progress(index, fraction * CONVERT_SHARE).await;
            }
            _ = &mut deadline => {
                break Err(BackendError::Timeout {
                    timeout_secs: engine.job_timeout.as_secs(),
                });
            }
        }
    };

    let raw = match result {
        Ok(raw) => raw,
        Err(BackendError::Cancelled) => return Finish::Cancelled,
        Err(e) => return Finish::Failed(JobError::from_backend(&e)),
    };
    // Checkpoint between conversion and post-processing.
    if batch.cancel.is_cancelled() {
        return Finish::Cancelled;
    }
    let selected: Vec<u32> = raw.artifacts.iter().filter_map(|a| a.index).collect();

    let mut warnings = Vec::new();
    let unmarked = raw.artifacts.iter().filter(|a| !a.format.is_raster()).count();
    if batch.settings.watermark.is_active() && unmarked > 0 {
        warn!(
            batch_id = %batch.id,
            job_id = %job.id,
            format = %plan.raw_format,
            "Watermark not applied to non-raster output"
        );
        warnings.push(format!("watermark not applied to {} output", plan.raw_format));
    }

    let target = job.output.clone();
    let options = batch.options.clone();
    let watermark = batch.settings.watermark.clone();
    let staging_dir = staging.to_path_buf();
    let stem = plan.stem.clone();
    let processed = tokio::task::spawn_blocking(move || {
        postprocess::process(
            raw,
            PostProcessPlan {
                target: &target,
                options: &options,
                watermark: &watermark,
                staging_dir: &staging_dir,
                stem: &stem,
            },
        )
    })
    .await;

    let finished = match processed {
        Ok(Ok(artifacts)) => artifacts,
        Ok(Err(e)) => {
            POSTPROCESS_FAILURES.with_label_values(&[e.stage()]).inc();
            return Finish::Failed(JobError::new(
                JobErrorKind::PostProcessingFailed,
                e.to_string(),
            ));
        }
        Err(e) => {
            return Finish::Failed(JobError::new(
                JobErrorKind::PostProcessingFailed,
                format!("post-processing task failed: {}", e),
            ));
        }
    };
    batch.set_progress(index, 0.95).await;

    match place(&finished, &job.destination).await {
        Ok(outputs) => Finish::Succeeded {
            outputs,
            selected,
            warnings,
        },
        Err(e) => {
            POSTPROCESS_FAILURES.with_label_values(&["placement"]).inc();
            Finish::Failed(JobError::new(
                JobErrorKind::ConversionFailed,
                format!("Failed to place output: {}", e),
            ))
        }
    }
}

/// Moves finished artifacts to their destination.
///
/// One artifact goes to `destination`; several become `<stem>_page_<n>`
/// siblings. Files already moved are removed again if a later move fails.
async fn place(artifacts: &[RawArtifact], destination: &Path) -> std::io::Result<Vec<PathBuf>> {
    if artifacts.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "backend produced no artifacts",
        ));
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let [single] = artifacts {
        move_file(&single.path, destination).await?;
        return Ok(vec![destination.to_path_buf()]);
    }

    let mut placed = Vec::with_capacity(artifacts.len());
    for (i, artifact) in artifacts.iter().enumerate() {
        let index = artifact.index.unwrap_or(i as u32 + 1);
        let target = page_destination(destination, index);
        if let Err(e) = move_file(&artifact.path, &target).await {
            for path in &placed {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(e);
        }
        placed.push(target);
    }
    Ok(placed)
}

/// Rename, falling back to copy and remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

async fn delete_source(source: &Path) {
    match tokio::fs::remove_file(source).await {
        Ok(()) => debug!(path = %source.display(), "Deleted source"),
        Err(e) => {
            POSTPROCESS_FAILURES
                .with_label_values(&["delete_source"])
                .inc();
            warn!(path = %source.display(), error = %e, "Failed to delete source");
        }
    }
}

/// Bundles every succeeded job's outputs into the reserved archive.
async fn archive_outputs(batch: &BatchShared) {
    let Some(path) = batch.archive_path.clone() else {
        return;
    };
    let files: Vec<PathBuf> = batch
        .report
        .read()
        .await
        .jobs
        .iter()
        .filter(|j| j.state == JobState::Succeeded)
        .flat_map(|j| j.outputs.iter().cloned())
        .collect();
    if files.is_empty() {
        return;
    }

    let archive_files = files.clone();
    let archive_path = path.clone();
    let result =
        tokio::task::spawn_blocking(move || create_archive(&archive_path, &archive_files)).await;

    let mut report = batch.report.write().await;
    match result {
        Ok(Ok(())) => {
            for file in &files {
                let _ = tokio::fs::remove_file(file).await;
            }
            info!(batch_id = %batch.id, path = %path.display(), files = files.len(), "Archived outputs");
            report.archive = Some(path);
        }
        Ok(Err(e)) => {
            POSTPROCESS_FAILURES.with_label_values(&[e.stage()]).inc();
            warn!(batch_id = %batch.id, error = %e, "Archiving failed, outputs left in place");
            report.archive_error = Some(e.to_string());
        }
        Err(e) => {
            POSTPROCESS_FAILURES.with_label_values(&["archive"]).inc();
            report.archive_error = Some(format!("archive task failed: {}", e));
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

/// Settings output directory, else the source's own directory.
fn output_dir(settings: &Settings, source: &Path) -> PathBuf {
    settings
        .output_dir
        .clone()
        .or_else(|| source.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."))
}
