//! Task status and the edges of the lifecycle graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally visible status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task accepted, no artifact published yet.
    #[default]
    Processing,
    /// Preview artifact published, final model still pending.
    Preview,
    /// Final model published.
    Success,
    /// Task failed; no further artifacts will be produced.
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Processing,
        TaskStatus::Preview,
        TaskStatus::Success,
        TaskStatus::Failed,
    ];

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true if `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Preview)
                | (Self::Processing, Self::Failed)
                | (Self::Preview, Self::Success)
                | (Self::Preview, Self::Failed)
        )
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Preview => "preview",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
