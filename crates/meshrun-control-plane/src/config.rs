//! Control plane configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use meshrun_engine::{
    HttpImageSource, ImageSource, MockEngine, Pipeline, ProcessEngine, ReconstructionOptions,
    SharedEngine,
};

/// Where submitted tasks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Run tasks in-process right after submission.
    Embedded,
    /// Leave tasks queued for remote workers to claim.
    Distributed,
}

/// Reconstruction engine backing the embedded executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// External reconstruction program, see `--engine-program`.
    Process,
    /// Placeholder artifacts, for dry runs.
    Mock,
}

/// Control plane configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "meshrun-control-plane", version, about = "MeshRun job API and worker coordinator")]
pub struct Config {
    /// HTTP server bind address.
    #[arg(long, env = "MESHRUN_BIND_ADDR", default_value = "0.0.0.0:7070")]
    pub bind_addr: String,

    /// Public base URL used to build absolute artifact links.
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:7070")]
    pub base_url: String,

    /// Directory served under `/assets`.
    #[arg(long, env = "MESHRUN_ASSETS_DIR", default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Scratch directory for the process engine's intermediate state.
    #[arg(long, env = "MESHRUN_WORK_DIR", default_value = "work")]
    pub work_dir: PathBuf,

    /// Execution mode for submitted tasks.
    #[arg(long, env = "MESHRUN_MODE", value_enum, default_value_t = ExecutionMode::Embedded)]
    pub mode: ExecutionMode,

    /// Bearer token workers must present. Worker routes are open when unset.
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Maximum accepted artifact upload size (MiB).
    #[arg(long, default_value_t = 512)]
    pub max_upload_mb: usize,

    /// Engine used in embedded mode.
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
    /// Build the execution pipeline for embedded mode.
    pub fn pipeline(&self) -> Result<Pipeline, meshrun_engine::FetchError> {
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

    pub fn reconstruction_options(&self) -> ReconstructionOptions {
        ReconstructionOptions {
            seed: self.seed,
            preview_fps: self.preview_fps,
            simplify: self.simplify,
            texture_size: self.texture_size,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7070".to_string(),
            base_url: "http://localhost:7070".to_string(),
            assets_dir: PathBuf::from("assets"),
            work_dir: PathBuf::from("work"),
            mode: ExecutionMode::Embedded,
            api_key: None,
            max_upload_mb: 512,
            engine: EngineKind::Process,
            engine_program: "meshrun-reconstruct".to_string(),
            download_timeout_secs: 30,
            stage_timeout_secs: None,
            seed: 1,
            preview_fps: 30,
            simplify: 0.95,
            texture_size: 1024,
        }
    }
}
