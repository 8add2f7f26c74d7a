//! Artifact uploads from workers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};

use meshrun_core::protocol::UploadResponse;
use tracing::warn;

use meshrun_core::{ArtifactKind, TaskId, WorkerId};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::StoreError;

struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

/// Store an uploaded preview or model under the assets directory.
///
/// Expects a `file` part and a `taskId` text part matching the path. The
/// task must be claimed; an optional `workerId` part must name the holder.
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let task_id = TaskId::new(id);

    let mut file = None;
    let mut form_task_id = None;
    let mut form_worker_id = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed upload: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("malformed upload: {e}")))?;
                file = Some(UploadedFile {
                    name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("taskId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("malformed upload: {e}")))?;
                form_task_id = Some(text);
            }
            Some("workerId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("malformed upload: {e}")))?;
                form_worker_id = Some(WorkerId::new(text));
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("missing 'file' part".to_string()))?;
    if let Some(form_id) = form_task_id {
        if form_id != task_id.as_str() {
            return Err(ApiError::Validation(format!(
                "taskId '{form_id}' does not match task {task_id}"
            )));
        }
    }
    let kind = ArtifactKind::from_file_name(&file.name).ok_or_else(|| {
        ApiError::Validation(format!("unsupported artifact file '{}'", file.name))
    })?;

    let record = state
        .store
        .get(&task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {task_id}")))?;
    if record.state.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "task {task_id} is already {}",
            record.status()
        )));
    }

    match (state.store.claimed_by(&task_id).await, form_worker_id) {
        (None, _) => return Err(StoreError::NotClaimed(task_id).into()),
        (Some(owner), Some(worker_id)) if owner != worker_id => {
            warn!(
                task_id = %task_id,
                owner = %owner,
                worker_id = %worker_id,
                "Upload from non-owner rejected"
            );
            return Err(StoreError::NotOwner { task_id, worker_id }.into());
        }
        _ => {}
    }

    let url = state
        .publisher
        .store_upload(&task_id, kind, &file.bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(UploadResponse { url }))
}
