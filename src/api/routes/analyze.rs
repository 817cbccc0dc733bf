//! Analysis Routes
//!
//! - POST /api/v1/analyze - Submit a canvas snapshot for analysis
//! - GET /api/v1/analyze/:id - Status of a submitted analysis
//!
//! A submission is only acknowledged here. The analysis itself is broadcast
//! to every connected client as an `analysis_result` frame.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::analysis::{ImageSnapshot, RequestId, RequestStatusView};
use crate::api::dto::{AnalyzeAccepted, AnalyzeRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::session::ClientId;

/// POST /api/v1/analyze
pub async fn submit_analysis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<(StatusCode, Json<AnalyzeAccepted>)> {
    let snapshot = ImageSnapshot::from_data_url(&req.image_data_url)?;

    let client = match req.client_id.map(ClientId::new) {
        Some(id) if !state.registry.contains(id).await => {
            return Err(ApiError::NotFound(format!("{} is not connected", id)));
        }
        other => other,
    };

    let request_id = state.coordinator.submit(client, snapshot);

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeAccepted {
            status: "accepted".to_string(),
            request_id,
        }),
    ))
}

/// GET /api/v1/analyze/:id
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RequestId>,
) -> ApiResult<Json<RequestStatusView>> {
    state
        .coordinator
        .status(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("analysis {}", id)))
}
