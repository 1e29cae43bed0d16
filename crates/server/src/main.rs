use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use convertino_core::settings::create_persistence;
use convertino_core::{
    default_backends, load_config, validate_config, BackendDirectory, CapabilityRegistry,
    ConfigStore, LogFormat, Scheduler, ToolLocator,
};
use convertino_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capacity of the settings writer queue
const SETTINGS_BUFFER_SIZE: usize = 64;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("CONVERTINO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(config.logging.format);
    info!(version = VERSION, "Starting convertino");
    info!("Configuration loaded from {:?}", config_path);

    // Settings store with its writer task
    let settings_path = config.store.settings_path.clone();
    let (persist_handle, persist_writer) =
        create_persistence(settings_path.clone(), SETTINGS_BUFFER_SIZE);
    let writer_handle = tokio::spawn(persist_writer.run());
    let store = ConfigStore::load(
        &settings_path,
        config.store.history_limit,
        config.store.persist_history,
    )
    .with_persistence(persist_handle);
    info!("Settings loaded from {:?}", settings_path);

    // Backends
    let mut locator = ToolLocator::new();
    if let Some(dir) = &config.backends.bundled_dir {
        locator = locator.with_bundled_dir(dir.clone());
    }
    let directory = Arc::new(BackendDirectory::new(
        default_backends(config.backends.timeout_secs),
        locator,
    ));
    directory
        .apply_overrides(&store.settings().backend_paths)
        .await;
    for status in directory.statuses().await {
        match (&status.path, &status.error) {
            (Some(path), _) if status.available => {
                info!(backend = %status.kind, path = %path.display(), version = ?status.version, "Backend available")
            }
            (_, error) => {
                info!(backend = %status.kind, reason = ?error, "Backend unavailable")
            }
        }
    }

    let registry =
        Arc::new(CapabilityRegistry::builtin().with_priority(config.backends.priority.clone()));
    let scheduler = Arc::new(
        Scheduler::new(config.scheduler.clone(), registry, directory)
            .context("Failed to create scheduler")?,
    );
    info!(workers = config.scheduler.workers, "Scheduler ready");

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&scheduler), store));
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.shutdown().await;
    info!("Batches settled");

    if let Err(e) = state.store().await.flush().await {
        tracing::error!("Failed to flush settings: {}", e);
    }

    // The store holds the last handle; the writer exits once it is gone.
    drop(state);
    let _ = writer_handle.await;
    info!("Settings writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
