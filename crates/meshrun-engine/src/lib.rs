//! Task execution for MeshRun.
//!
//! This crate wraps the external reconstruction engine behind a trait and
//! provides the [`Pipeline`] that drives a single task through image
//! acquisition, reconstruction, preview and model publication. The embedded
//! executor in the control plane and the remote worker both run tasks
//! through the same pipeline, differing only in how artifacts are published
//! and where transitions are reported.

mod engine;
mod error;
mod mock;
mod pipeline;
mod process;
mod publish;
mod source;

pub use engine::{
    EngineGuard, Reconstruction, ReconstructionEngine, ReconstructionOptions, SharedEngine,
    SourceImage,
};
pub use error::{EngineError, FetchError, PipelineError, PublishError, ReportError, Stage};
pub use mock::{MockBehavior, MockEngine, StaticImageSource};
pub use pipeline::Pipeline;
pub use process::ProcessEngine;
pub use publish::{ArtifactPublisher, StatusReporter};
pub use source::{HttpImageSource, ImageSource};

// Re-exported so callers can build test images without a direct dependency.
pub use image::DynamicImage;
