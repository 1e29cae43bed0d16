//! Common test utilities for API testing with mock backends.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock backends injected, so batches run without external tools.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convertino_core::{
    settings::create_persistence, testing::MockBackend, Backend, BackendDirectory, BackendKind,
    CapabilityRegistry, Config, ConfigStore, Scheduler, SchedulerConfig, ToolLocator,
};
use convertino_server::state::AppState;

/// Re-export fixtures for test convenience
pub use convertino_core::testing::fixtures;

/// Test fixture for API testing with mock backends.
///
/// Provides an in-process server with controllable mocks for:
/// - Raster image conversion (ImageCodec)
/// - PDF rasterization with a fixed page count (PdfRaster)
/// - An uninstalled markup backend (Markup)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///     let source = fixture.write_source("a.png");
///
///     let response = fixture.post("/api/v1/batches", json!({
///         "sources": [source],
///         "output_format": "jpg"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Mock image codec backend
    pub image: Arc<MockBackend>,
    /// Mock PDF rasterizer
    pub pdf: Arc<MockBackend>,
    /// Temporary directory for sources, outputs and settings
    pub temp_dir: TempDir,
    /// Directory batches write to
    pub output_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("output");
        let settings_path = temp_dir.path().join("settings.json");

        let image = Arc::new(
            MockBackend::new(BackendKind::ImageCodec).with_duration(test_config.job_duration),
        );
        let pdf = Arc::new(MockBackend::new(BackendKind::PdfRaster).with_pages(3));
        let markup = Arc::new(MockBackend::new(BackendKind::Markup).unavailable());
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::clone(&image) as Arc<dyn Backend>,
            Arc::clone(&pdf) as Arc<dyn Backend>,
            markup as Arc<dyn Backend>,
        ];
        let directory = Arc::new(BackendDirectory::new(backends, ToolLocator::new()));

        let mut config = Config::default();
        config.scheduler = SchedulerConfig::default()
            .with_workers(test_config.workers)
            .with_temp_dir(temp_dir.path().join("staging"));
        config.store.settings_path = settings_path.clone();

        let scheduler = Arc::new(
            Scheduler::new(
                config.scheduler.clone(),
                Arc::new(CapabilityRegistry::builtin()),
                directory,
            )
            .expect("Failed to create scheduler"),
        );

        // Settings writer
        let (handle, writer) = create_persistence(settings_path.clone(), 16);
        tokio::spawn(writer.run());
        let mut store = ConfigStore::load(&settings_path, 50, true).with_persistence(handle);
        store
            .apply(convertino_core::SettingsChange::SetOutputDir {
                path: Some(output_dir.clone()),
            })
            .expect("Failed to set output dir");

        let state = Arc::new(AppState::new(config, scheduler, store));
        let router = convertino_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            image,
            pdf,
            temp_dir,
            output_dir,
        }
    }

    /// Write a small source file and return its path.
    pub fn write_source(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join("sources");
        std::fs::create_dir_all(&dir).expect("Failed to create sources dir");
        let path = dir.join(name);
        if name.ends_with(".png") {
            fixtures::write_png(&path, 16, 16).expect("Failed to write png");
        } else {
            std::fs::write(&path, b"source").expect("Failed to write source");
        }
        path
    }

    /// Poll a batch until it reports an outcome.
    pub async fn wait_for_batch(&self, id: &str) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/batches/{}", id)).await;
            if response.body.get("outcome").is_some() {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Batch {} did not finish in time", id);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch a path and return the body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Worker pool size
    pub workers: usize,
    /// Simulated duration of each image conversion
    pub job_duration: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            job_duration: Duration::ZERO,
        }
    }
}

impl TestConfig {
    /// Create config with slow image conversions (for cancellation tests).
    pub fn with_slow_jobs() -> Self {
        Self {
            workers: 1,
            job_duration: Duration::from_millis(500),
        }
    }
}
