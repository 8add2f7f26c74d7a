//! The reconstruction engine contract and its process-wide handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use meshrun_core::TaskId;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::EngineError;

/// A decoded source image.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Where the image was fetched from.
    pub url: String,
    pub image: DynamicImage,
}

/// Handle to the intermediate representation an engine produced for a task.
///
/// The engine owns what `location` points at; the pipeline only passes the
/// handle back for rendering, export and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub task_id: TaskId,
    pub location: PathBuf,
}

/// Tuning knobs forwarded to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionOptions {
    pub seed: u64,
    pub preview_fps: u32,
    /// Fraction of mesh faces removed during export.
    pub simplify: f32,
    pub texture_size: u32,
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            seed: 1,
            preview_fps: 30,
            simplify: 0.95,
            texture_size: 1024,
        }
    }
}

/// Image-to-3D conversion capability.
///
/// Implementations are not assumed reentrant: every call goes through
/// [`SharedEngine`], which serializes access and initializes lazily.
#[async_trait]
pub trait ReconstructionEngine: Send {
    /// Load models or verify the backing program. Called once before first use.
    async fn initialize(&mut self) -> Result<(), EngineError>;

    /// Build the intermediate representation for a task.
    async fn reconstruct(
        &mut self,
        task_id: &TaskId,
        image: &SourceImage,
        segm_mode: &str,
    ) -> Result<Reconstruction, EngineError>;

    /// Render a preview video to `output`.
    async fn render_preview(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError>;

    /// Export the final GLB model to `output`.
    async fn export_model(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError>;

    /// Drop any scratch state kept for `task_id`. Called once per task after
    /// it reaches a terminal state, whether or not reconstruction succeeded.
    async fn release(&mut self, _task_id: &TaskId) {}
}

struct EngineSlot {
    engine: Box<dyn ReconstructionEngine>,
    initialized: bool,
}

/// Process-wide engine singleton. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct SharedEngine {
    slot: Arc<Mutex<EngineSlot>>,
}

/// Exclusive, initialized access to the shared engine.
///
/// Other tasks wait for the engine until the guard is dropped.
pub struct EngineGuard<'a> {
    slot: MutexGuard<'a, EngineSlot>,
}

impl SharedEngine {
    pub fn new(engine: impl ReconstructionEngine + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(EngineSlot {
                engine: Box::new(engine),
                initialized: false,
            })),
        }
    }

    /// Wait for the engine, initializing it on first use. A failed
    /// initialization is retried by the next caller.
    pub async fn acquire(&self) -> Result<EngineGuard<'_>, EngineError> {
        let mut slot = self.slot.lock().await;
        if !slot.initialized {
            info!("Initializing reconstruction engine");
            slot.engine.initialize().await?;
            slot.initialized = true;
        }
        Ok(EngineGuard { slot })
    }

    pub async fn release(&self, task_id: &TaskId) {
        let mut slot = self.slot.lock().await;
        slot.engine.release(task_id).await;
    }
}

impl EngineGuard<'_> {
    pub async fn reconstruct(
        &mut self,
        task_id: &TaskId,
        image: &SourceImage,
        segm_mode: &str,
    ) -> Result<Reconstruction, EngineError> {
        self.slot.engine.reconstruct(task_id, image, segm_mode).await
    }

    pub async fn render_preview(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.slot.engine.render_preview(reconstruction, output).await
    }

    pub async fn export_model(
        &mut self,
        reconstruction: &Reconstruction,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.slot.engine.export_model(reconstruction, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    #[tokio::test]
    async fn test_engine_initialized_once() {
        let mock = MockEngine::new();
        let inits = mock.init_counter();
        let engine = SharedEngine::new(mock);
        let dir = tempfile::tempdir().unwrap();
        let image = SourceImage {
            url: "https://x/cat.png".into(),
            image: DynamicImage::new_rgb8(2, 2),
        };

        for i in 0..3 {
            let id = TaskId::new(format!("t{i}"));
            let mut guard = engine.acquire().await.unwrap();
            let rec = guard.reconstruct(&id, &image, "auto").await.unwrap();
            guard
                .render_preview(&rec, &dir.path().join(format!("{i}.mp4")))
                .await
                .unwrap();
            drop(guard);
            engine.release(&id).await;
        }

        assert_eq!(inits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_serializes_access() {
        let engine = SharedEngine::new(MockEngine::new());
        let guard = engine.acquire().await.unwrap();

        let waiting = engine.clone();
        let second = tokio::spawn(async move { waiting.acquire().await.map(|_| ()) });
        tokio::task::yield_now().await;
        assert!(!second.is_finished());

        drop(guard);
        second.await.unwrap().unwrap();
    }
}
