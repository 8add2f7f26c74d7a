//! Artifact publication under the control plane's static assets directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use meshrun_core::{ArtifactKind, TaskId};
use meshrun_engine::{ArtifactPublisher, PublishError};

/// Publishes artifacts as static files served under `<base_url>/assets`.
///
/// Engine output is staged outside the assets directory and only moved into
/// the served tree once complete.
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    assets_dir: PathBuf,
    staging_dir: PathBuf,
    base_url: String,
}

impl LocalPublisher {
    pub fn new(
        assets_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        base_url: &str,
    ) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            staging_dir: staging_dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of an artifact.
    pub fn url_for(&self, task_id: &TaskId, kind: ArtifactKind) -> String {
        format!("{}/assets/{}", self.base_url, kind.relative_path(task_id))
    }

    fn path_for(&self, task_id: &TaskId, kind: ArtifactKind) -> PathBuf {
        self.assets_dir.join(kind.relative_path(task_id))
    }

    /// Store an uploaded artifact and return its canonical URL.
    ///
    /// The file is written next to its final location and renamed into
    /// place, so the static server never serves a half-written artifact.
    pub async fn store_upload(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<String, PublishError> {
        let path = self.path_for(task_id, kind);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = path.with_extension("part");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        info!(
            task_id = %task_id,
            kind = ?kind,
            bytes = bytes.len(),
            path = %path.display(),
            "Artifact stored"
        );
        Ok(self.url_for(task_id, kind))
    }
}

/// Move `from` to `to`, copying when they sit on different filesystems.
async fn move_into_place(from: &Path, to: &Path) -> Result<(), PublishError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if let Err(e) = tokio::fs::rename(from, to).await {
        debug!(error = %e, "Rename failed, copying artifact instead");
        let partial = to.with_extension("part");
        tokio::fs::copy(from, &partial).await?;
        tokio::fs::rename(&partial, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

#[async_trait]
impl ArtifactPublisher for LocalPublisher {
    fn staging_path(&self, task_id: &TaskId, kind: ArtifactKind) -> PathBuf {
        self.staging_dir.join(kind.staging_file_name(task_id))
    }

    async fn publish(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<String, PublishError> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(PublishError::Upload(format!(
                "{} is not a file",
                path.display()
            )));
        }

        let dest = self.path_for(task_id, kind);
        move_into_place(path, &dest).await?;
        debug!(task_id = %task_id, path = %dest.display(), "Artifact moved into assets");
        Ok(self.url_for(task_id, kind))
    }

    async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Staged artifact discarded"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard staged artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let publisher = LocalPublisher::new("assets", "work", "https://h/");
        let id = TaskId::new("t1");
        assert_eq!(
            publisher.url_for(&id, ArtifactKind::Preview),
            "https://h/assets/previews/t1.mp4"
        );
        assert_eq!(
            publisher.url_for(&id, ArtifactKind::Model),
            "https://h/assets/models/t1.glb"
        );
        assert_eq!(
            publisher.staging_path(&id, ArtifactKind::Model),
            PathBuf::from("work/t1-model.glb")
        );
    }

    #[tokio::test]
    async fn test_store_upload() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path(), dir.path().join("work"), "https://h");
        let id = TaskId::new("t1");

        let url = publisher
            .store_upload(&id, ArtifactKind::Model, b"glTF")
            .await
            .unwrap();

        assert_eq!(url, "https://h/assets/models/t1.glb");
        let stored = tokio::fs::read(dir.path().join("models/t1.glb")).await.unwrap();
        assert_eq!(stored, b"glTF");
        assert!(!dir.path().join("models/t1.part").exists());
    }

    #[tokio::test]
    async fn test_publish_moves_staged_file() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(assets.path(), work.path(), "https://h");
        let id = TaskId::new("t1");

        let staged = publisher.staging_path(&id, ArtifactKind::Preview);
        tokio::fs::write(&staged, b"mp4").await.unwrap();

        let url = publisher
            .publish(&id, ArtifactKind::Preview, &staged)
            .await
            .unwrap();
        assert_eq!(url, "https://h/assets/previews/t1.mp4");
        assert!(!staged.exists());
        assert!(assets.path().join("previews/t1.mp4").exists());

        // Nothing left to discard once published.
        publisher.discard(&staged).await;
    }

    #[tokio::test]
    async fn test_discarded_artifact_never_served() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(assets.path(), work.path(), "https://h");
        let id = TaskId::new("t1");

        let staged = publisher.staging_path(&id, ArtifactKind::Model);
        tokio::fs::write(&staged, b"partial").await.unwrap();
        publisher.discard(&staged).await;

        assert!(!staged.exists());
        assert!(!assets.path().join("models/t1.glb").exists());
    }
}
