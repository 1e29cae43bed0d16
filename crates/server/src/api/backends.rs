//! Backend discovery API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use convertino_core::{BackendKind, BackendStatus, SettingsChange};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<BackendStatus>,
    pub available: usize,
}

impl From<Vec<BackendStatus>> for BackendsResponse {
    fn from(backends: Vec<BackendStatus>) -> Self {
        Self {
            available: backends.iter().filter(|b| b.available).count(),
            backends,
        }
    }
}

/// Request body for setting a backend path. `null` clears the override.
#[derive(Debug, Deserialize)]
pub struct SetBackendPathBody {
    pub path: Option<PathBuf>,
}

/// Status of every backend, detecting the ones not yet probed.
pub async fn list_backends(State(state): State<Arc<AppState>>) -> Json<BackendsResponse> {
    Json(state.directory().statuses().await.into())
}

/// Discards cached detection and probes every backend again.
pub async fn detect_backends(State(state): State<Arc<AppState>>) -> Json<BackendsResponse> {
    info!("Re-detecting all backends");
    Json(state.directory().redetect_all().await.into())
}

/// Sets or clears the configured path of one backend.
///
/// The change is recorded in settings, so it persists and can be undone.
pub async fn set_backend_path(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(body): Json<SetBackendPathBody>,
) -> Result<Json<BackendStatus>, ApiError> {
    let kind: BackendKind = kind
        .parse()
        .map_err(|e: String| api_error(StatusCode::NOT_FOUND, e))?;

    {
        let mut store = state.store().await;
        store
            .apply(SettingsChange::SetBackendPath {
                kind,
                path: body.path.clone(),
            })
            .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    }

    state.directory().set_override(kind, body.path).await;
    Ok(Json(state.directory().redetect(kind).await))
}
