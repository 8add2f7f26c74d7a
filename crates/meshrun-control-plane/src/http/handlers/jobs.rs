//! Job submission and status query.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::info;

use meshrun_core::protocol::{SubmitRequest, SubmitResponse};
use meshrun_core::{TaskId, TaskInput, TaskView};

use crate::error::ApiError;
use crate::state::AppState;

/// Create a task and return its id without waiting for any execution.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(req) = body?;
    let input = TaskInput::new(&req.image_url, req.segm_mode)?;
    let record = state.store.create(input).await;

    match &state.executor {
        Some(executor) => executor.spawn(&record),
        None => {
            state.store.make_claimable(&record.id).await;
            info!(task_id = %record.id, "Task awaiting a worker");
        }
    }

    Ok(Json(SubmitResponse { id: record.id }))
}

/// Latest committed view of a task.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task_id = TaskId::new(id);
    state
        .store
        .get(&task_id)
        .await
        .map(|record| Json(record.view()))
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {task_id}")))
}
