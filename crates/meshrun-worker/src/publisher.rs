//! Publishes artifacts by uploading them to the coordinator.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use meshrun_core::{ArtifactKind, TaskId};
use meshrun_engine::{ArtifactPublisher, PublishError};

use crate::client::CoordinatorClient;

/// Stages artifacts in the work directory and uploads them.
pub struct UploadPublisher {
    client: Arc<CoordinatorClient>,
    work_dir: PathBuf,
}

impl UploadPublisher {
    pub fn new(client: Arc<CoordinatorClient>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for UploadPublisher {
    fn staging_path(&self, task_id: &TaskId, kind: ArtifactKind) -> PathBuf {
        self.work_dir.join(kind.staging_file_name(task_id))
    }

    async fn publish(
        &self,
        task_id: &TaskId,
        _kind: ArtifactKind,
        path: &Path,
    ) -> Result<String, PublishError> {
        let url = self
            .client
            .upload(task_id, path)
            .await
            .map_err(|e| PublishError::Upload(e.to_string()))?;
        remove_staged(path).await;
        Ok(url)
    }

    async fn discard(&self, path: &Path) {
        remove_staged(path).await;
    }
}

async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged artifact"),
    }
}
