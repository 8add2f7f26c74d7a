//! In-process doubles for the engine and the image source.
//!
//! `MockEngine` writes small placeholder artifacts instead of running a model;
//! the control plane and worker expose it as `--engine mock` for dry runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use meshrun_core::TaskId;

use crate::engine::{Reconstruction, ReconstructionEngine, SourceImage};
use crate::error::{EngineError, FetchError, Stage};
use crate::source::ImageSource;

/// What the mock engine does at a given stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    #[default]
    Succeed,
    FailAt(Stage),
    PanicAt(Stage),
}

/// Engine that produces placeholder files.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    behavior: MockBehavior,
    inits: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Counter of `initialize` calls, shared with clones.
    pub fn init_counter(&self) -> Arc<AtomicUsize> {
        self.inits.clone()
    }

    fn check(&self, stage: Stage) -> Result<(), EngineError> {
        match self.behavior {
            MockBehavior::FailAt(s) if s == stage => {
                Err(EngineError::Failed(format!("mock {stage} failure")))
            }
            MockBehavior::PanicAt(s) if s == stage => panic!("mock {stage} panic"),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ReconstructionEngine for MockEngine {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reconstruct(
        &mut self,
        task_id: &TaskId,
        _image: &SourceImage,
        _segm_mode: &str,
    ) -> Result<Reconstruction, EngineError> {
        self.check(Stage::Reconstruct)?;
        Ok(Reconstruction {
            task_id: task_id.clone(),
            location: PathBuf::new(),
        })
    }

    async fn render_preview(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.check(Stage::RenderPreview)?;
        let body = format!("mock preview for {}", reconstruction.task_id);
        tokio::fs::write(output, body).await?;
        Ok(())
    }

    async fn export_model(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.check(Stage::ExportModel)?;
        let body = format!("mock model for {}", reconstruction.task_id);
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Image source that serves one in-memory image for every URL, or fails
/// every fetch when empty.
#[derive(Debug, Clone, Default)]
pub struct StaticImageSource {
    image: Option<DynamicImage>,
}

impl StaticImageSource {
    pub fn new(image: DynamicImage) -> Self {
        Self { image: Some(image) }
    }

    /// A source whose every fetch fails with HTTP 404.
    pub fn unavailable() -> Self {
        Self { image: None }
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn fetch(&self, url: &str) -> Result<SourceImage, FetchError> {
        let image = self.image.clone().ok_or(FetchError::Status(404))?;
        Ok(SourceImage {
            url: url.to_string(),
            image,
        })
    }
}
