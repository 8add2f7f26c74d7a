//! Error types for the execution pipeline.

use std::fmt;
use std::time::Duration;

use meshrun_core::TaskStatus;
use thiserror::Error;

/// A step of the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Reconstruct,
    RenderPreview,
    PublishPreview,
    ExportModel,
    PublishModel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquire => "image acquisition",
            Self::Reconstruct => "reconstruction",
            Self::RenderPreview => "preview rendering",
            Self::PublishPreview => "preview publication",
            Self::ExportModel => "model export",
            Self::PublishModel => "model publication",
        };
        f.write_str(name)
    }
}

/// Errors raised by a reconstruction engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine program could not be found.
    #[error("reconstruction program not found at '{0}'")]
    ProgramNotFound(String),

    /// I/O failure while running the engine or writing its output.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine process exited unsuccessfully.
    #[error("{command} exited with code {code}: {stderr}")]
    ProcessError {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Engine finished without producing the expected file.
    #[error("engine produced no output at '{0}'")]
    MissingOutput(String),

    /// Source image could not be handed to the engine.
    #[error("failed to encode source image: {0}")]
    ImageEncode(String),

    /// Generic engine failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors raised while downloading or decoding the source image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download image: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to download image: HTTP {0}")]
    Status(u16),

    #[error("failed to decode image: {0}")]
    Decode(String),
}

/// Errors raised while publishing an artifact.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// Errors raised while reporting a transition to the task owner.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The store or coordinator refused the transition.
    #[error("report rejected: {0}")]
    Rejected(String),

    /// The report never reached the coordinator.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Why a task execution failed. The display form becomes the task's error
/// message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquisition(#[from] FetchError),

    #[error("{stage} failed: {source}")]
    Engine {
        stage: Stage,
        #[source]
        source: EngineError,
    },

    #[error("{stage} failed: {source}")]
    Publication {
        stage: Stage,
        #[source]
        source: PublishError,
    },

    #[error("failed to report {status}: {source}")]
    Report {
        status: TaskStatus,
        #[source]
        source: ReportError,
    },

    #[error("{stage} timed out after {limit:?}")]
    Timeout { stage: Stage, limit: Duration },

    #[error("execution panicked: {0}")]
    Panicked(String),
}
