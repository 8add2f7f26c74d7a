//! Task record, the lifecycle state machine, and its external view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CoreError, TaskId, TaskStatus};

/// Segmentation mode used when the submitter does not pick one.
pub const DEFAULT_SEGM_MODE: &str = "auto";

/// Output-format key under which the final model is published.
pub const GLB_FORMAT: &str = "glb";

/// Error code attached to every execution-time failure.
pub const EXECUTION_ERROR_CODE: i32 = 10001;

/// Immutable input of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    /// Absolute http(s) URL of the source image.
    pub image_url: String,

    /// Segmentation mode handed to the reconstruction engine.
    #[serde(default = "default_segm_mode")]
    pub segm_mode: String,
}

fn default_segm_mode() -> String {
    DEFAULT_SEGM_MODE.to_string()
}

impl TaskInput {
    /// Validate and build a task input.
    ///
    /// `image_url` must parse as an absolute `http` or `https` URL. A missing
    /// or blank `segm_mode` falls back to [`DEFAULT_SEGM_MODE`].
    pub fn new(image_url: &str, segm_mode: Option<String>) -> Result<Self, CoreError> {
        let url = Url::parse(image_url.trim())
            .map_err(|e| CoreError::InvalidInput(format!("image_url is not a valid URL: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(CoreError::InvalidInput(format!(
                "image_url must be an http(s) URL, got '{image_url}'"
            )));
        }

        let segm_mode = segm_mode
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(default_segm_mode);

        Ok(Self {
            image_url: url.to_string(),
            segm_mode,
        })
    }
}

/// Error carried by a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: i32,
    pub message: String,
}

impl TaskError {
    /// Execution failure with the generic error code.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            code: EXECUTION_ERROR_CODE,
            message: message.into(),
        }
    }
}

/// Lifecycle state of a task. Each variant carries exactly the fields that
/// are observable in that status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Processing,
    Preview {
        preview: String,
    },
    Success {
        preview: String,
        models: BTreeMap<String, String>,
    },
    Failed {
        preview: Option<String>,
        error: TaskError,
    },
}

/// A state change reported by the owner of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Preview { preview: String },
    Success { models: BTreeMap<String, String> },
    Failed { error: TaskError },
}

impl Transition {
    /// Success with a single GLB model URL.
    pub fn success_glb(url: impl Into<String>) -> Self {
        let mut models = BTreeMap::new();
        models.insert(GLB_FORMAT.to_string(), url.into());
        Self::Success { models }
    }

    /// Failure with the generic execution error code.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            error: TaskError::execution(message),
        }
    }

    /// Status the task ends up in once this transition is applied.
    pub fn target(&self) -> TaskStatus {
        match self {
            Self::Preview { .. } => TaskStatus::Preview,
            Self::Success { .. } => TaskStatus::Success,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Processing => TaskStatus::Processing,
            Self::Preview { .. } => TaskStatus::Preview,
            Self::Success { .. } => TaskStatus::Success,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn preview(&self) -> Option<&str> {
        match self {
            Self::Processing => None,
            Self::Preview { preview } | Self::Success { preview, .. } => Some(preview),
            Self::Failed { preview, .. } => preview.as_deref(),
        }
    }

    /// Compute the state that follows `transition`.
    ///
    /// Only the four edges of the lifecycle graph are accepted. A preview URL
    /// set earlier is carried into `Success` and `Failed`.
    pub fn apply(&self, transition: Transition) -> Result<TaskState, CoreError> {
        let to = transition.target();
        match (self, transition) {
            (Self::Processing, Transition::Preview { preview }) => {
                if preview.trim().is_empty() {
                    return Err(CoreError::InvalidInput("preview URL is empty".into()));
                }
                Ok(Self::Preview { preview })
            }
            (Self::Preview { preview }, Transition::Success { models }) => {
                if !models.contains_key(GLB_FORMAT) {
                    return Err(CoreError::InvalidInput(format!(
                        "success output must contain a '{GLB_FORMAT}' model"
                    )));
                }
                Ok(Self::Success {
                    preview: preview.clone(),
                    models,
                })
            }
            (Self::Processing, Transition::Failed { error }) => Ok(Self::Failed {
                preview: None,
                error,
            }),
            (Self::Preview { preview }, Transition::Failed { error }) => Ok(Self::Failed {
                preview: Some(preview.clone()),
                error,
            }),
            _ => Err(CoreError::InvalidStateTransition {
                from: self.status(),
                to,
            }),
        }
    }
}

/// A task tracked by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub input: TaskInput,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new record in `Processing` with a fresh id.
    pub fn new(input: TaskInput) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            input,
            state: TaskState::Processing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Apply a transition, replacing the whole state at once.
    pub fn apply(&mut self, transition: Transition) -> Result<(), CoreError> {
        self.state = self.state.apply(transition)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Externally visible projection of this record.
    pub fn view(&self) -> TaskView {
        TaskView::from(self)
    }
}

/// Status response: `{ id, status, preview?, models?, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl From<&TaskRecord> for TaskView {
    fn from(record: &TaskRecord) -> Self {
        let (models, error) = match &record.state {
            TaskState::Success { models, .. } => (Some(models.clone()), None),
            TaskState::Failed { error, .. } => (None, Some(error.clone())),
            _ => (None, None),
        };

        Self {
            id: record.id.clone(),
            status: record.status(),
            preview: record.state.preview().map(str::to_string),
            models,
            error,
        }
    }
}
