//! Artifact kinds and their persisted layout.

use crate::{TaskId, GLB_FORMAT};

/// Artifact produced while executing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Preview video rendered from the intermediate representation.
    Preview,
    /// Final exported model.
    Model,
}

impl ArtifactKind {
    /// Directory under the assets root.
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Preview => "previews",
            Self::Model => "models",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Preview => "mp4",
            Self::Model => GLB_FORMAT,
        }
    }

    /// Published path relative to the assets root, e.g. `previews/{id}.mp4`.
    pub fn relative_path(&self, task_id: &TaskId) -> String {
        format!("{}/{}.{}", self.directory(), task_id, self.extension())
    }

    /// File name used when staging the artifact in a worker's work directory.
    pub fn staging_file_name(&self, task_id: &TaskId) -> String {
        let suffix = match self {
            Self::Preview => "preview",
            Self::Model => "model",
        };
        format!("{}-{}.{}", task_id, suffix, self.extension())
    }

    /// Infer the kind from an uploaded file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" => Some(Self::Preview),
            "glb" => Some(Self::Model),
            _ => None,
        }
    }
}
