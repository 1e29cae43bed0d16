//! Capability registry API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use convertino_core::capability::OptionKey;
use convertino_core::{BackendKind, CapabilityEdge, Format, FormatCategory};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub edges: Vec<CapabilityEdge>,
    pub count: usize,
}

/// One reachable output for a given input.
#[derive(Debug, Serialize)]
pub struct OutputCapability {
    pub format: Format,
    /// Candidate backends, best first.
    pub backends: Vec<BackendKind>,
    pub options: Vec<OptionKey>,
    pub paged: bool,
}

#[derive(Debug, Serialize)]
pub struct FormatCapabilities {
    pub format: Format,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FormatCategory>,
    pub outputs: Vec<OutputCapability>,
}

/// Every declared edge.
pub async fn list_capabilities(State(state): State<Arc<AppState>>) -> Json<CapabilitiesResponse> {
    let edges = state.registry().edges().to_vec();
    Json(CapabilitiesResponse {
        count: edges.len(),
        edges,
    })
}

/// Outputs reachable from one input format.
pub async fn get_format(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
) -> Result<Json<FormatCapabilities>, ApiError> {
    let input = Format::new(&format);
    let registry = state.registry();
    let reachable = registry.reachable(&input);
    if reachable.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No conversions from format: {}", input),
        ));
    }

    let outputs = reachable
        .into_iter()
        .filter_map(|output| {
            let candidates = registry.candidates(&input, &output);
            let best = candidates.first()?;
            Some(OutputCapability {
                backends: candidates.iter().map(|e| e.backend).collect(),
                options: best.options.clone(),
                paged: best.paged,
                format: output,
            })
        })
        .collect();

    Ok(Json(FormatCapabilities {
        category: input.category(),
        format: input,
        outputs,
    }))
}
