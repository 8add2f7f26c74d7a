//! Seams through which the pipeline hands off artifacts and reports state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use meshrun_core::{ArtifactKind, TaskId, Transition};

use crate::error::{PublishError, ReportError};

/// Makes artifacts reachable and returns their canonical URL.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Where the engine should write `kind` for `task_id`.
    fn staging_path(&self, task_id: &TaskId, kind: ArtifactKind) -> PathBuf;

    /// Publish the file at `path` and return its external URL.
    async fn publish(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<String, PublishError>;

    /// Remove a staged file left behind once the task is terminal.
    async fn discard(&self, _path: &Path) {}
}

/// Receives the transitions of a task, in order.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, task_id: &TaskId, transition: Transition) -> Result<(), ReportError>;
}
