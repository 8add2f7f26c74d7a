//! Worker claim and status report handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::debug;

use meshrun_core::protocol::{ClaimRequest, ClaimResponse, ReportAck, ReportRequest};
use meshrun_core::{TaskId, IMAGE_TO_3D_TASK_TYPE};

use crate::error::ApiError;
use crate::state::AppState;

/// Hand the oldest claimable task to the calling worker, or `{}`.
pub async fn claim(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let Json(req) = body?;
    if req.worker_id.is_blank() {
        return Err(ApiError::Validation("worker_id must not be empty".to_string()));
    }
    if req.task_type != IMAGE_TO_3D_TASK_TYPE {
        debug!(worker_id = %req.worker_id, task_type = %req.task_type, "Unsupported task type");
        return Ok(Json(ClaimResponse::empty()));
    }

    let job = state.store.claim(&req.worker_id).await;
    Ok(Json(job.into()))
}

/// Apply a status report from the worker holding the claim.
pub async fn report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportAck>, ApiError> {
    let Json(req) = body?;
    let task_id = TaskId::new(id);
    let worker_id = req.worker_id.clone();
    let transition = req.into_transition()?;

    let record = state.store.apply_as(&task_id, &worker_id, transition).await?;
    Ok(Json(ReportAck {
        id: record.id.clone(),
        status: record.status(),
    }))
}
