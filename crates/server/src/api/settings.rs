//! Settings store API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use convertino_core::settings::{Preset, RecentFileEntry};
use convertino_core::{ConfigStore, Settings, SettingsChange, StoreError};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: Settings,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl From<&ConfigStore> for SettingsResponse {
    fn from(store: &ConfigStore) -> Self {
        Self {
            settings: store.settings().clone(),
            can_undo: store.can_undo(),
            can_redo: store.can_redo(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<Preset>,
    pub active: String,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
    pub files: Vec<RecentFileEntry>,
}

fn store_error(e: StoreError) -> ApiError {
    let status = match e {
        StoreError::UnknownPreset(_) => StatusCode::NOT_FOUND,
        StoreError::BuiltinPreset(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Persistence { .. } | StoreError::WriterClosed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

/// Pushes the stored backend paths into the directory.
///
/// Runs after every settings move so undo also reverts path overrides.
async fn sync_backend_paths(state: &AppState, response: SettingsResponse) -> Json<SettingsResponse> {
    state
        .directory()
        .apply_overrides(&response.settings.backend_paths)
        .await;
    Json(response)
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let store = state.store().await;
    Json(SettingsResponse::from(&*store))
}

/// Apply one change, recorded as a new undo step
pub async fn apply_change(
    State(state): State<Arc<AppState>>,
    Json(change): Json<SettingsChange>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let response = {
        let mut store = state.store().await;
        store.apply(change).map_err(store_error)?;
        SettingsResponse::from(&*store)
    };
    Ok(sync_backend_paths(&state, response).await)
}

pub async fn undo(State(state): State<Arc<AppState>>) -> Result<Json<SettingsResponse>, ApiError> {
    let response = {
        let mut store = state.store().await;
        if store.undo().is_none() {
            return Err(api_error(StatusCode::BAD_REQUEST, "Nothing to undo"));
        }
        SettingsResponse::from(&*store)
    };
    Ok(sync_backend_paths(&state, response).await)
}

pub async fn redo(State(state): State<Arc<AppState>>) -> Result<Json<SettingsResponse>, ApiError> {
    let response = {
        let mut store = state.store().await;
        if store.redo().is_none() {
            return Err(api_error(StatusCode::BAD_REQUEST, "Nothing to redo"));
        }
        SettingsResponse::from(&*store)
    };
    Ok(sync_backend_paths(&state, response).await)
}

pub async fn list_presets(State(state): State<Arc<AppState>>) -> Json<PresetsResponse> {
    let store = state.store().await;
    Json(PresetsResponse {
        presets: store.presets(),
        active: store.settings().active_preset.clone(),
    })
}

pub async fn list_recent(State(state): State<Arc<AppState>>) -> Json<RecentResponse> {
    let store = state.store().await;
    Json(RecentResponse {
        files: store.recent().to_vec(),
    })
}
