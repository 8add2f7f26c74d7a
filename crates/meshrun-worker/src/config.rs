//! Worker configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use meshrun_core::WorkerId;
use meshrun_engine::{
    FetchError, HttpImageSource, ImageSource, MockEngine, Pipeline, ProcessEngine,
    ReconstructionOptions, SharedEngine,
};

/// Reconstruction engine used by this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// External reconstruction program, see `--engine-program`.
    Process,
    /// Placeholder artifacts, for dry runs.
    Mock,
}

/// Worker configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "meshrun-worker", version, about = "MeshRun reconstruction worker")]
pub struct Config {
    /// Coordinator API base URL.
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:3000/api/v1")]
    pub api_base: String,

    /// Bearer token presented to the coordinator.
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Worker ID. A random one is generated at startup when unset.
    #[arg(long, env = "MESHRUN_WORKER_ID")]
    pub worker_id: Option<String>,

    /// Directory where artifacts are staged before upload.
    #[arg(long, default_value = "assets")]
    pub work_dir: PathBuf,

    /// Delay before polling again when no job is available (milliseconds).
    #[arg(long, default_value_t = 1000)]
    pub idle_poll_ms: u64,

    /// Delay after an unexpected coordinator error (seconds).
    #[arg(long, default_value_t = 5)]
    pub error_backoff_secs: u64,

    /// Timeout for a single coordinator request, uploads included (seconds).
    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = EngineKind::Process)]
    pub engine: EngineKind,

    /// Reconstruction program invoked by the process engine.
    #[arg(long, env = "MESHRUN_ENGINE_PROGRAM", default_value = "meshrun-reconstruct")]
    pub engine_program: String,

    /// Image download timeout (seconds).
    #[arg(long, default_value_t = 30)]
    pub download_timeout_secs: u64,

    /// Per-stage execution timeout (seconds). Stages are unbounded when unset.
    #[arg(long)]
    pub stage_timeout_secs: Option<u64>,

    /// Reconstruction seed.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Preview video frame rate.
    #[arg(long, default_value_t = 30)]
    pub preview_fps: u32,

    /// Fraction of mesh faces removed during export.
    #[arg(long, default_value_t = 0.95)]
    pub simplify: f32,

    /// Exported texture size (pixels).
    #[arg(long, default_value_t = 1024)]
    pub texture_size: u32,
}

impl Config {
    /// Configured worker ID, or a fresh one.
    pub fn resolve_worker_id(&self) -> WorkerId {
        match &self.worker_id {
            Some(id) if !id.trim().is_empty() => WorkerId::new(id.trim()),
            _ => WorkerId::generate(),
        }
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconstruction_options(&self) -> ReconstructionOptions {
        ReconstructionOptions {
            seed: self.seed,
            preview_fps: self.preview_fps,
            simplify: self.simplify,
            texture_size: self.texture_size,
        }
    }

    /// Build the execution pipeline.
    pub fn pipeline(&self) -> Result<Pipeline, FetchError> {
        let engine = match self.engine {
            EngineKind::Process => SharedEngine::new(
                ProcessEngine::new(self.engine_program.clone(), self.work_dir.clone())
                    .with_options(self.reconstruction_options()),
            ),
            EngineKind::Mock => SharedEngine::new(MockEngine::new()),
        };
        let images: Arc<dyn ImageSource> = Arc::new(HttpImageSource::new(Some(
            Duration::from_secs(self.download_timeout_secs),
        ))?);

        Ok(Pipeline::new(engine, images)
            .with_stage_timeout(self.stage_timeout_secs.map(Duration::from_secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["meshrun-worker"]).unwrap();
        assert_eq!(config.idle_poll(), Duration::from_millis(1000));
        assert_eq!(config.error_backoff(), Duration::from_secs(5));
        assert_eq!(config.work_dir, PathBuf::from("assets"));
        assert_eq!(config.engine, EngineKind::Process);
        assert_eq!(config.reconstruction_options(), ReconstructionOptions::default());
    }

    #[test]
    fn test_reconstruction_options() {
        let config =
            Config::try_parse_from(["meshrun-worker", "--simplify", "0.5", "--preview-fps", "24"])
                .unwrap();

        let options = config.reconstruction_options();
        assert_eq!(options.simplify, 0.5);
        assert_eq!(options.preview_fps, 24);
        assert_eq!(options.seed, 1);
    }

    #[test]
    fn test_worker_id() {
        let config =
            Config::try_parse_from(["meshrun-worker", "--worker-id", " gpu-01 "]).unwrap();
        assert_eq!(config.resolve_worker_id().as_str(), "gpu-01");

        let config = Config {
            worker_id: None,
            ..config
        };
        assert!(!config.resolve_worker_id().is_blank());
    }
}
