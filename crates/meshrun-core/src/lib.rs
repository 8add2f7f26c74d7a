//! MeshRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Async runtimes
//! - The reconstruction engine
//!
//! All types here describe the image-to-3D task lifecycle and the wire
//! protocol shared by the control plane and its workers.

pub mod artifact;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use artifact::ArtifactKind;
pub use error::CoreError;
pub use ids::{TaskId, WorkerId};
pub use status::TaskStatus;
pub use task::{
    TaskError, TaskInput, TaskRecord, TaskState, TaskView, Transition, DEFAULT_SEGM_MODE,
    EXECUTION_ERROR_CODE, GLB_FORMAT,
};

/// Task type served by the claim protocol.
pub const IMAGE_TO_3D_TASK_TYPE: &str = "image-to-3d";
