use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{backends, batches, capabilities, handlers, settings, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Capabilities
        .route("/capabilities", get(capabilities::list_capabilities))
        .route("/capabilities/{format}", get(capabilities::get_format))
        // Backends
        .route("/backends", get(backends::list_backends))
        .route("/backends/detect", post(backends::detect_backends))
        .route("/backends/{kind}/path", put(backends::set_backend_path))
        // Batches
        .route(
            "/batches",
            post(batches::submit_batch).get(batches::list_batches),
        )
        .route(
            "/batches/{id}",
            get(batches::get_batch).delete(batches::cancel_batch),
        )
        .route("/batches/{id}/events", get(ws::batch_events))
        .route("/scheduler/status", get(batches::scheduler_status))
        // Settings
        .route("/settings", get(settings::get_settings))
        .route("/settings/changes", post(settings::apply_change))
        .route("/settings/undo", post(settings::undo))
        .route("/settings/redo", post(settings::redo))
        .route("/presets", get(settings::list_presets))
        .route("/recent", get(settings::list_recent));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
