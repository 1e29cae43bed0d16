//! Batch API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use convertino_core::{BatchReport, BatchRequest, Format, PoolStatus, Settings, SubmitError};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a batch
#[derive(Debug, Deserialize)]
pub struct SubmitBatchBody {
    /// Source files, converted in order.
    pub sources: Vec<PathBuf>,
    /// Target format for every source.
    pub output_format: String,
    /// Settings snapshot; the stored settings when absent.
    #[serde(default)]
    pub settings: Option<Settings>,
    /// Date for `{date}` placeholders; today when absent.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchReport>,
    pub count: usize,
}

fn submit_error(e: SubmitError) -> ApiError {
    let status = match e {
        SubmitError::NoSources => StatusCode::BAD_REQUEST,
        SubmitError::UnknownFormat { .. } | SubmitError::Unsupported(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SubmitError::NoWorkers | SubmitError::Staging { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a batch
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBatchBody>,
) -> Result<(StatusCode, Json<BatchReport>), ApiError> {
    let output = Format::new(&body.output_format);
    let settings = match body.settings {
        Some(settings) => settings,
        None => state.store().await.settings().clone(),
    };

    let mut request = BatchRequest::new(body.sources.clone(), output.clone(), settings);
    if let Some(date) = body.date {
        request = request.with_date(date);
    }

    let handle = state
        .scheduler()
        .submit(request)
        .await
        .map_err(submit_error)?;

    {
        let mut store = state.store().await;
        for source in body.sources {
            store.record(source, output.clone());
        }
    }

    info!(batch_id = %handle.id(), "Batch accepted");
    Ok((StatusCode::CREATED, Json(handle.snapshot().await)))
}

/// List every known batch
pub async fn list_batches(State(state): State<Arc<AppState>>) -> Json<ListBatchesResponse> {
    let batches = state.scheduler().batches().await;
    Json(ListBatchesResponse {
        count: batches.len(),
        batches,
    })
}

/// Get a batch by ID
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchReport>, ApiError> {
    match state.scheduler().batch(&id).await {
        Some(handle) => Ok(Json(handle.snapshot().await)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        )),
    }
}

/// Cancel a batch (DELETE endpoint)
///
/// Returns the snapshot taken right after the request; jobs settle
/// asynchronously.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchReport>, ApiError> {
    let Some(handle) = state.scheduler().batch(&id).await else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        ));
    };
    handle.cancel();
    Ok(Json(handle.snapshot().await))
}

/// Worker pool status
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<PoolStatus> {
    Json(state.scheduler().status().await)
}
