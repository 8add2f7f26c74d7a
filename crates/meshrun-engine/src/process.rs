//! Engine backed by an external reconstruction program.
//!
//! Each stage is one invocation of the program:
//!
//! ```text
//! <program> reconstruct    --input <png> --segm-mode <mode> --seed <n> --output <state-dir>
//! <program> render-preview --state <state-dir> --output <mp4> --fps <n>
//! <program> export         --state <state-dir> --output <glb> --simplify <f> --texture-size <n>
//! ```
//!
//! The program must exit with status 0 on success; stderr is captured and
//! returned in the error otherwise.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::ImageFormat;
use meshrun_core::TaskId;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::{Reconstruction, ReconstructionEngine, ReconstructionOptions, SourceImage};
use crate::error::EngineError;

/// Longest stderr excerpt kept in an error message.
const STDERR_TAIL: usize = 512;

/// Runs an external program for each engine stage.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    /// Path to the reconstruction program.
    program: String,

    /// Scratch directory for per-task state.
    work_dir: PathBuf,

    options: ReconstructionOptions,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
            options: ReconstructionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconstructionOptions) -> Self {
        self.options = options;
        self
    }


    fn state_dir(&self, task_id: &TaskId) -> PathBuf {
        self.work_dir.join(".state").join(task_id.as_str())
    }

    async fn run(&self, args: &[String]) -> Result<(), EngineError> {
        let subcommand = args.first().cloned().unwrap_or_default();

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = ?cmd, "Spawning reconstruction program");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ProgramNotFound(self.program.clone())
            } else {
                EngineError::Io(e)
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!(subcommand = %subcommand, stderr = %line.trim(), "Engine stderr");
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(subcommand = %subcommand, exit_code = code, "Reconstruction program failed");
            return Err(EngineError::ProcessError {
                command: format!("{} {}", self.program, subcommand),
                code,
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ReconstructionEngine for ProcessEngine {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        info!(program = %self.program, "Checking reconstruction program");
        self.run(&["--version".to_string()]).await?;
        tokio::fs::create_dir_all(self.work_dir.join(".state")).await?;
        Ok(())
    }

    async fn reconstruct(
        &mut self,
        task_id: &TaskId,
        image: &SourceImage,
        segm_mode: &str,
    ) -> Result<Reconstruction, EngineError> {
        let dir = self.state_dir(task_id);
        tokio::fs::create_dir_all(&dir).await?;

        let decoded = image.image.clone();
        let png = tokio::task::spawn_blocking(move || {
            let mut buf = Cursor::new(Vec::new());
            decoded
                .write_to(&mut buf, ImageFormat::Png)
                .map(|_| buf.into_inner())
        })
        .await
        .map_err(|e| EngineError::ImageEncode(e.to_string()))?
        .map_err(|e| EngineError::ImageEncode(e.to_string()))?;

        let input = dir.join("input.png");
        tokio::fs::write(&input, png).await?;

        info!(task_id = %task_id, segm_mode = %segm_mode, "Running reconstruction");
        self.run(&[
            "reconstruct".to_string(),
            "--input".to_string(),
            input.display().to_string(),
            "--segm-mode".to_string(),
            segm_mode.to_string(),
            "--seed".to_string(),
            self.options.seed.to_string(),
            "--output".to_string(),
            dir.display().to_string(),
        ])
        .await?;

        Ok(Reconstruction {
            task_id: task_id.clone(),
            location: dir,
        })
    }

    async fn render_preview(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.run(&[
            "render-preview".to_string(),
            "--state".to_string(),
            reconstruction.location.display().to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--fps".to_string(),
            self.options.preview_fps.to_string(),
        ])
        .await?;
        ensure_output(output).await
    }

    async fn export_model(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.run(&[
            "export".to_string(),
            "--state".to_string(),
            reconstruction.location.display().to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--simplify".to_string(),
            self.options.simplify.to_string(),
            "--texture-size".to_string(),
            self.options.texture_size.to_string(),
        ])
        .await?;
        ensure_output(output).await
    }

    async fn release(&mut self, task_id: &TaskId) {
        let dir = self.state_dir(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(task_id = %task_id, "Reconstruction state removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                task_id = %task_id,
                error = %e,
                "Failed to remove reconstruction state"
            ),
        }
    }
}

async fn ensure_output(output: &Path) -> Result<(), EngineError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(EngineError::MissingOutput(output.display().to_string())),
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
