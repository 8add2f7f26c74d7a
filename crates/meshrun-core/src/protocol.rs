//! JSON bodies exchanged over the job API and the worker protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CoreError, TaskError, TaskId, TaskInput, TaskStatus, Transition, WorkerId, GLB_FORMAT};

/// Output key older workers use for the GLB model.
const LEGACY_MODEL_KEY: &str = "model_url";

// ============================================================================
// Job API
// ============================================================================

/// `POST /image-to-3d` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segm_mode: Option<String>,
}

/// `POST /image-to-3d` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: TaskId,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Worker protocol
// ============================================================================

/// `POST /tasks/claim` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: WorkerId,
    pub task_type: String,
}

/// A job handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: TaskId,
    pub input: TaskInput,
}

/// `POST /tasks/claim` response; serializes to `{}` when no job is available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<TaskInput>,
}

impl ClaimResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn into_job(self) -> Option<ClaimedJob> {
        match (self.id, self.input) {
            (Some(id), Some(input)) => Some(ClaimedJob { id, input }),
            _ => None,
        }
    }
}

impl From<Option<ClaimedJob>> for ClaimResponse {
    fn from(job: Option<ClaimedJob>) -> Self {
        match job {
            Some(job) => Self {
                id: Some(job.id),
                input: Some(job.input),
            },
            None => Self::empty(),
        }
    }
}

/// `POST /tasks/{id}` body: a status report from the worker holding the claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub worker_id: WorkerId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl ReportRequest {
    /// Build the report body for a transition.
    pub fn new(worker_id: WorkerId, transition: &Transition) -> Self {
        let mut report = Self {
            worker_id,
            status: transition.target(),
            preview_url: None,
            output: None,
            error: None,
        };
        match transition {
            Transition::Preview { preview } => report.preview_url = Some(preview.clone()),
            Transition::Success { models } => report.output = Some(models.clone()),
            Transition::Failed { error } => report.error = Some(error.clone()),
        }
        report
    }

    /// Convert the body into the transition it requests.
    pub fn into_transition(self) -> Result<Transition, CoreError> {
        match self.status {
            TaskStatus::Processing => Err(CoreError::InvalidInput(
                "'processing' cannot be reported".into(),
            )),
            TaskStatus::Preview => self
                .preview_url
                .map(|preview| Transition::Preview { preview })
                .ok_or_else(|| CoreError::InvalidInput("preview report without preview_url".into())),
            TaskStatus::Success => {
                let mut models = self
                    .output
                    .ok_or_else(|| CoreError::InvalidInput("success report without output".into()))?;
                if !models.contains_key(GLB_FORMAT) {
                    if let Some(url) = models.remove(LEGACY_MODEL_KEY) {
                        models.insert(GLB_FORMAT.to_string(), url);
                    }
                }
                Ok(Transition::Success { models })
            }
            TaskStatus::Failed => self
                .error
                .map(|error| Transition::Failed { error })
                .ok_or_else(|| CoreError::InvalidInput("failed report without error".into())),
        }
    }
}

/// `POST /tasks/{id}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub id: TaskId,
    pub status: TaskStatus,
}

/// `POST /tasks/{id}/assets` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}
