//! Batch lifecycle integration tests.
//!
//! These tests drive the scheduler end to end with mock backends:
//! submit -> queued -> running -> post-processing -> placement -> finished

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;

use convertino_core::{
    testing::{fixtures, MockBackend},
    Backend, BackendDirectory, BackendKind, BatchEvent, BatchOutcome, BatchRequest,
    CapabilityRegistry, Format, JobErrorKind, JobState, Scheduler, SchedulerConfig, Settings,
    SubmitError, ToolLocator,
};

/// Test helper owning the scheduler and its directories.
struct TestHarness {
    scheduler: Scheduler,
    sources: PathBuf,
    output: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(workers: usize, backends: Vec<Arc<MockBackend>>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let sources = temp_dir.path().join("sources");
        let output = temp_dir.path().join("output");
        std::fs::create_dir_all(&sources).unwrap();

        let config = SchedulerConfig::default()
            .with_workers(workers)
            .with_temp_dir(temp_dir.path().join("staging"));
        let backends: Vec<Arc<dyn Backend>> = backends
            .into_iter()
            .map(|b| b as Arc<dyn Backend>)
            .collect();
        let directory = Arc::new(BackendDirectory::new(backends, ToolLocator::new()));
        let scheduler = Scheduler::new(
            config,
            Arc::new(CapabilityRegistry::builtin()),
            directory,
        )
        .expect("Failed to create scheduler");

        Self {
            scheduler,
            sources,
            output,
            _temp_dir: temp_dir,
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            output_dir: Some(self.output.clone()),
            ..Default::default()
        }
    }

    /// Creates real source images named `names` and returns their paths.
    fn sources(&self, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = self.sources.join(name);
                if Format::from_path(&path).is_some_and(|f| f.is_raster()) {
                    fixtures::write_png(&path, 32, 24).unwrap();
                } else {
                    std::fs::write(&path, b"source").unwrap();
                }
                path
            })
            .collect()
    }

    fn request(&self, sources: Vec<PathBuf>, output: &str, settings: Settings) -> BatchRequest {
        BatchRequest::new(sources, Format::new(output), settings)
            .with_date(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_batch_converts_every_source() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec));
    let harness = TestHarness::new(3, vec![backend.clone()]);
    let sources = harness.sources(&["a.png", "b.png", "c.png"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "jpg", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.outcome, Some(BatchOutcome::Succeeded));
    assert_eq!(report.total(), 3);
    assert!(report.jobs.iter().all(|j| j.state == JobState::Succeeded));
    assert!(report.jobs.iter().all(|j| j.progress == 1.0));
    assert_eq!(files_in(&harness.output), vec!["a.jpg", "b.jpg", "c.jpg"]);
    assert_eq!(backend.recorded_requests().await.len(), 3);

    let decoded = image::open(harness.output.join("a.jpg")).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[tokio::test]
async fn test_worker_limit_bounds_running_jobs() {
    let backend =
        Arc::new(MockBackend::new(BackendKind::ImageCodec).with_duration(Duration::from_millis(80)));
    let harness = TestHarness::new(2, vec![backend.clone()]);
    let sources = harness.sources(&["1.png", "2.png", "3.png", "4.png", "5.png", "6.png"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "bmp", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.outcome, Some(BatchOutcome::Succeeded));
    assert!(backend.max_concurrent() <= 2);
    assert!(backend.max_concurrent() >= 1);

    let status = harness.scheduler.status().await;
    assert_eq!(status.workers, 2);
    assert_eq!(status.active_jobs, 0);
    assert_eq!(status.queued_jobs, 0);
    assert_eq!(status.total_processed, 6);
}

#[tokio::test]
async fn test_worker_limit_spans_batches() {
    let backend =
        Arc::new(MockBackend::new(BackendKind::ImageCodec).with_duration(Duration::from_millis(60)));
    let harness = TestHarness::new(2, vec![backend.clone()]);
    let first = harness.sources(&["a1.png", "a2.png", "a3.png"]);
    let second = harness.sources(&["b1.png", "b2.png", "b3.png"]);

    let one = harness
        .scheduler
        .submit(harness.request(first, "jpg", harness.settings()))
        .await
        .unwrap();
    let two = harness
        .scheduler
        .submit(harness.request(second, "jpg", harness.settings()))
        .await
        .unwrap();
    one.wait().await;
    two.wait().await;

    assert!(backend.max_concurrent() <= 2);
    assert_eq!(files_in(&harness.output).len(), 6);
}

#[tokio::test]
async fn test_one_failure_does_not_affect_siblings() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec).failing_on("b.png"));
    let harness = TestHarness::new(2, vec![backend]);
    let sources = harness.sources(&["a.png", "b.png", "c.png"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "jpg", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.outcome, Some(BatchOutcome::CompletedWithFailures));
    assert_eq!(report.count(JobState::Succeeded), 2);

    let failed = &report.jobs[1];
    assert_eq!(failed.state, JobState::Failed);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.kind, JobErrorKind::ConversionFailed);
    assert!(error.diagnostics.as_deref().unwrap().contains("forced failure"));
    assert!(failed.outputs.is_empty());

    assert_eq!(files_in(&harness.output), vec!["a.jpg", "c.jpg"]);
}

#[tokio::test]
async fn test_invalid_range_fails_jobs_before_running() {
    let backend = Arc::new(MockBackend::new(BackendKind::PdfRaster).with_pages(4));
    let harness = TestHarness::new(2, vec![backend.clone()]);
    let sources = harness.sources(&["doc.pdf", "other.pdf"]);
    let settings = Settings {
        page_range: "5-2".to_string(),
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "png", settings))
        .await
        .unwrap();
    let mut events = handle.subscribe();

    let mut states = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            BatchEvent::Job(event) => states.push(event.state),
            BatchEvent::Finished { outcome } => {
                assert_eq!(outcome, BatchOutcome::CompletedWithFailures);
                break;
            }
            BatchEvent::Progress { .. } => {}
        }
    }

    assert_eq!(states, vec![JobState::Failed, JobState::Failed]);
    let report = handle.snapshot().await;
    for job in &report.jobs {
        let error = job.error.as_ref().unwrap();
        assert_eq!(error.kind, JobErrorKind::InvalidRange);
        assert!(error.message.contains("5-2"));
        assert!(job.started_at.is_none());
    }
    assert!(backend.recorded_requests().await.is_empty());
}

#[tokio::test]
async fn test_page_beyond_extent_is_job_failure() {
    let backend = Arc::new(MockBackend::new(BackendKind::PdfRaster).with_pages(2));
    let harness = TestHarness::new(1, vec![backend]);
    let sources = harness.sources(&["short.pdf"]);
    let settings = Settings {
        page_range: "1,4".to_string(),
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "png", settings))
        .await
        .unwrap();
    let report = handle.wait().await;

    let error = report.jobs[0].error.as_ref().unwrap();
    assert_eq!(error.kind, JobErrorKind::InvalidRange);
    assert!(files_in(&harness.output).is_empty());
}

#[tokio::test]
async fn test_paged_output_is_split_per_page() {
    let backend = Arc::new(MockBackend::new(BackendKind::PdfRaster).with_pages(5));
    let harness = TestHarness::new(1, vec![backend]);
    let sources = harness.sources(&["deck.pdf"]);
    let settings = Settings {
        page_range: "1,3-4".to_string(),
        reverse_pages: true,
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "png", settings))
        .await
        .unwrap();
    let report = handle.wait().await;

    let job = &report.jobs[0];
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.selected_indices, vec![4, 3, 1]);
    assert_eq!(
        file_names(&job.outputs),
        vec!["deck_page_4.png", "deck_page_3.png", "deck_page_1.png"]
    );
    assert_eq!(
        files_in(&harness.output),
        vec!["deck_page_1.png", "deck_page_3.png", "deck_page_4.png"]
    );
}

#[tokio::test]
async fn test_paged_output_assembles_into_container() {
    let backend = Arc::new(MockBackend::new(BackendKind::PdfRaster).with_pages(3));
    let harness = TestHarness::new(1, vec![backend.clone()]);
    let sources = harness.sources(&["scan.pdf"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "tiff", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    let job = &report.jobs[0];
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(file_names(&job.outputs), vec!["scan.tiff"]);
    assert_eq!(files_in(&harness.output), vec!["scan.tiff"]);

    // The backend was asked for raster pages, not the container.
    let requests = backend.recorded_requests().await;
    assert_eq!(requests[0].output, Format::new("png"));
}

#[tokio::test]
async fn test_destinations_never_collide() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec));
    let harness = TestHarness::new(2, vec![backend]);
    std::fs::create_dir_all(&harness.output).unwrap();
    std::fs::write(harness.output.join("photo.jpg"), b"existing").unwrap();

    let first = harness.sources.join("one");
    let second = harness.sources.join("two");
    std::fs::create_dir_all(&first).unwrap();
    std::fs::create_dir_all(&second).unwrap();
    let sources = vec![first.join("photo.png"), second.join("photo.png")];
    for source in &sources {
        fixtures::write_png(source, 8, 8).unwrap();
    }

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "jpg", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(
        file_names(&[report.jobs[0].destination.clone(), report.jobs[1].destination.clone()]),
        vec!["photo_1.jpg", "photo_2.jpg"]
    );
    assert_eq!(
        std::fs::read(harness.output.join("photo.jpg")).unwrap(),
        b"existing"
    );
    assert_eq!(
        files_in(&harness.output),
        vec!["photo.jpg", "photo_1.jpg", "photo_2.jpg"]
    );
}

#[tokio::test]
async fn test_output_pattern_expands_date() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec));
    let harness = TestHarness::new(1, vec![backend]);
    let sources = harness.sources(&["cover.png"]);
    let settings = Settings {
        output_pattern: "{date}/{filename}_web".to_string(),
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "bmp", settings))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.jobs[0].state, JobState::Succeeded);
    assert!(harness.output.join("2026-10-14").join("cover_web.bmp").is_file());
}

#[tokio::test]
async fn test_cancel_stops_remaining_jobs() {
    let backend = Arc::new(
        MockBackend::new(BackendKind::ImageCodec).with_duration(Duration::from_millis(400)),
    );
    let harness = TestHarness::new(1, vec![backend.clone()]);
    let sources = harness.sources(&["a.png", "b.png", "c.png"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "jpg", harness.settings()))
        .await
        .unwrap();
    let mut events = handle.subscribe();

    loop {
        if let BatchEvent::Job(event) = events.recv().await.unwrap() {
            if event.state == JobState::Running {
                break;
            }
        }
    }
    assert!(harness.scheduler.cancel(handle.id()).await);
    let report = handle.wait().await;

    assert_eq!(report.outcome, Some(BatchOutcome::Cancelled));
    assert_eq!(report.count(JobState::Cancelled), 3);
    assert_eq!(backend.recorded_requests().await.len(), 1);
    assert!(files_in(&harness.output).is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_batch() {
    let harness = TestHarness::new(1, vec![Arc::new(MockBackend::new(BackendKind::ImageCodec))]);
    assert!(!harness.scheduler.cancel("missing").await);
    assert!(harness.scheduler.batch("missing").await.is_none());
}

#[tokio::test]
async fn test_archive_bundles_outputs() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec).failing_on("bad.png"));
    let harness = TestHarness::new(2, vec![backend]);
    let sources = harness.sources(&["a.png", "bad.png", "b.png"]);
    let settings = Settings {
        archive_outputs: true,
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "jpg", settings))
        .await
        .unwrap();
    let report = handle.wait().await;

    let archive = report.archive.clone().expect("archive created");
    assert_eq!(archive, harness.output.join("convertino_2026-10-14.zip"));
    assert!(report.archive_error.is_none());
    assert_eq!(files_in(&harness.output), vec!["convertino_2026-10-14.zip"]);

    let file = std::fs::File::open(&archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
}

#[tokio::test]
async fn test_delete_sources_only_after_success() {
    let backend = Arc::new(MockBackend::new(BackendKind::ImageCodec).failing_on("keep.png"));
    let harness = TestHarness::new(2, vec![backend]);
    let sources = harness.sources(&["gone.png", "keep.png"]);
    let settings = Settings {
        delete_sources: true,
        ..harness.settings()
    };

    let handle = harness
        .scheduler
        .submit(harness.request(sources.clone(), "jpg", settings))
        .await
        .unwrap();
    handle.wait().await;

    assert!(!sources[0].exists());
    assert!(sources[1].exists());
}

#[tokio::test]
async fn test_unsupported_pair_rejects_batch() {
    let harness = TestHarness::new(1, vec![Arc::new(MockBackend::new(BackendKind::ImageCodec))]);
    let sources = harness.sources(&["a.png", "song.mp3"]);

    let result = harness
        .scheduler
        .submit(harness.request(sources, "jpg", harness.settings()))
        .await;
    assert!(matches!(result, Err(SubmitError::Unsupported(_))));
    assert!(harness.scheduler.batches().await.is_empty());
}

#[tokio::test]
async fn test_empty_and_unknown_sources_rejected() {
    let harness = TestHarness::new(1, vec![Arc::new(MockBackend::new(BackendKind::ImageCodec))]);

    let empty = harness
        .scheduler
        .submit(harness.request(Vec::new(), "jpg", harness.settings()))
        .await;
    assert!(matches!(empty, Err(SubmitError::NoSources)));

    let unknown = harness
        .scheduler
        .submit(harness.request(
            vec![harness.sources.join("notes.xyz")],
            "jpg",
            harness.settings(),
        ))
        .await;
    assert!(matches!(unknown, Err(SubmitError::UnknownFormat { .. })));
}

#[tokio::test]
async fn test_unavailable_backend_fails_job() {
    let backend = Arc::new(MockBackend::new(BackendKind::Markup).unavailable());
    let harness = TestHarness::new(1, vec![backend]);
    let sources = harness.sources(&["notes.md"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "html", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    let error = report.jobs[0].error.as_ref().unwrap();
    assert_eq!(error.kind, JobErrorKind::BackendUnavailable);
}

#[tokio::test]
async fn test_zero_workers_rejected() {
    let config = SchedulerConfig::default().with_workers(0);
    let directory = Arc::new(BackendDirectory::new(Vec::new(), ToolLocator::new()));
    let result = Scheduler::new(config, Arc::new(CapabilityRegistry::builtin()), directory);
    assert!(matches!(result, Err(SubmitError::NoWorkers)));
}

#[tokio::test]
async fn test_watermark_failure_fails_only_that_job() {
    let image = Arc::new(MockBackend::new(BackendKind::ImageCodec));
    let office = Arc::new(MockBackend::new(BackendKind::Office));
    let harness = TestHarness::new(2, vec![image, office]);
    let sources = harness.sources(&["photo.png", "report.docx"]);

    let mut settings = harness.settings();
    settings.watermark.enabled = true;
    settings.watermark.text = "DRAFT".to_string();
    settings.watermark.font_path = Some(harness.sources.join("missing-font.ttf"));

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "pdf", settings))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.outcome, Some(BatchOutcome::CompletedWithFailures));

    let photo = &report.jobs[0];
    assert_eq!(photo.state, JobState::Failed);
    let error = photo.error.as_ref().unwrap();
    assert_eq!(error.kind, JobErrorKind::PostProcessingFailed);
    assert!(photo.outputs.is_empty());

    // The office output has no pixels to mark; it succeeds with a warning.
    let document = &report.jobs[1];
    assert_eq!(document.state, JobState::Succeeded);
    assert_eq!(document.warnings.len(), 1);
    assert!(document.warnings[0].contains("watermark"));

    // Neither the raw nor a partial artifact of the failed job is left behind.
    assert_eq!(files_in(&harness.output), vec!["report.pdf"]);
}

#[tokio::test]
async fn test_no_warnings_without_watermark() {
    let office = Arc::new(MockBackend::new(BackendKind::Office));
    let harness = TestHarness::new(1, vec![office]);
    let sources = harness.sources(&["report.docx"]);

    let handle = harness
        .scheduler
        .submit(harness.request(sources, "pdf", harness.settings()))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(report.jobs[0].state, JobState::Succeeded);
    assert!(report.jobs[0].warnings.is_empty());
}
