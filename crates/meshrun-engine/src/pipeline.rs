//! Drives one task through acquisition, reconstruction and publication.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use meshrun_core::protocol::ClaimedJob;
use meshrun_core::{ArtifactKind, TaskStatus, Transition};
use tracing::{error, info, warn};

use crate::engine::{EngineGuard, Reconstruction, SharedEngine};
use crate::error::{PipelineError, Stage};
use crate::publish::{ArtifactPublisher, StatusReporter};
use crate::source::ImageSource;

/// Execution sequence shared by the embedded executor and remote workers.
#[derive(Clone)]
pub struct Pipeline {
    engine: SharedEngine,
    images: Arc<dyn ImageSource>,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(engine: SharedEngine, images: Arc<dyn ImageSource>) -> Self {
        Self {
            engine,
            images,
            stage_timeout: None,
        }
    }

    /// Bound every engine and publication stage by `timeout`.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Execute `job` to a terminal state.
    ///
    /// Errors and panics raised by any stage are caught here and reported as
    /// a `Failed` transition. Returns the terminal status reached.
    pub async fn execute<P, R>(&self, job: &ClaimedJob, publisher: &P, reporter: &R) -> TaskStatus
    where
        P: ArtifactPublisher + ?Sized,
        R: StatusReporter + ?Sized,
    {
        info!(task_id = %job.id, image_url = %job.input.image_url, "Starting task execution");

        let mut staged = Vec::new();
        let outcome = AssertUnwindSafe(self.run_stages(job, publisher, reporter, &mut staged))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
        };

        let status = match result {
            Ok(()) => {
                info!(task_id = %job.id, "Task completed");
                TaskStatus::Success
            }
            Err(e) => {
                error!(task_id = %job.id, error = %e, "Task failed");
                if let Err(report_err) = reporter
                    .report(&job.id, Transition::failed(e.to_string()))
                    .await
                {
                    error!(
                        task_id = %job.id,
                        error = %report_err,
                        "Failed to report task failure"
                    );
                }
                TaskStatus::Failed
            }
        };

        for path in staged {
            publisher.discard(&path).await;
        }
        self.engine.release(&job.id).await;

        status
    }

    async fn run_stages<P, R>(
        &self,
        job: &ClaimedJob,
        publisher: &P,
        reporter: &R,
        staged: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError>
    where
        P: ArtifactPublisher + ?Sized,
        R: StatusReporter + ?Sized,
    {
        let image = self
            .timed(Stage::Acquire, async {
                Ok(self.images.fetch(&job.input.image_url).await?)
            })
            .await?;

        let reconstruction = {
            let mut engine = self.acquire(Stage::Reconstruct).await?;
            self.timed(Stage::Reconstruct, async {
                engine
                    .reconstruct(&job.id, &image, &job.input.segm_mode)
                    .await
                    .map_err(|source| PipelineError::Engine {
                        stage: Stage::Reconstruct,
                        source,
                    })
            })
            .await?
        };
        drop(image);

        self.publish_artifacts(job, &reconstruction, publisher, reporter, staged)
            .await
    }

    /// Wait for the shared engine. Queueing behind other tasks is not
    /// counted against the stage timeout.
    async fn acquire(&self, stage: Stage) -> Result<EngineGuard<'_>, PipelineError> {
        self.engine
            .acquire()
            .await
            .map_err(|source| PipelineError::Engine { stage, source })
    }

    async fn publish_artifacts<P, R>(
        &self,
        job: &ClaimedJob,
        reconstruction: &Reconstruction,
        publisher: &P,
        reporter: &R,
        staged: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError>
    where
        P: ArtifactPublisher + ?Sized,
        R: StatusReporter + ?Sized,
    {
        let preview = self
            .produce(
                job,
                reconstruction,
                ArtifactKind::Preview,
                publisher,
                staged,
            )
            .await?;
        report(reporter, job, Transition::Preview { preview }).await?;

        let model = self
            .produce(job, reconstruction, ArtifactKind::Model, publisher, staged)
            .await?;
        report(reporter, job, Transition::success_glb(model)).await
    }

    /// Render or export one artifact, then publish it.
    async fn produce<P>(
        &self,
        job: &ClaimedJob,
        reconstruction: &Reconstruction,
        kind: ArtifactKind,
        publisher: &P,
        staged: &mut Vec<PathBuf>,
    ) -> Result<String, PipelineError>
    where
        P: ArtifactPublisher + ?Sized,
    {
        let (build_stage, publish_stage) = match kind {
            ArtifactKind::Preview => (Stage::RenderPreview, Stage::PublishPreview),
            ArtifactKind::Model => (Stage::ExportModel, Stage::PublishModel),
        };

        let path = publisher.staging_path(&job.id, kind);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Publication {
                    stage: publish_stage,
                    source: e.into(),
                })?;
        }
        staged.push(path.clone());

        let mut engine = self.acquire(build_stage).await?;
        self.timed(build_stage, async {
            let built = match kind {
                ArtifactKind::Preview => engine.render_preview(reconstruction, &path).await,
                ArtifactKind::Model => engine.export_model(reconstruction, &path).await,
            };
            built.map_err(|source| PipelineError::Engine {
                stage: build_stage,
                source,
            })
        })
        .await?;
        drop(engine);

        let url = self
            .timed(publish_stage, async {
                publisher
                    .publish(&job.id, kind, &path)
                    .await
                    .map_err(|source| PipelineError::Publication {
                        stage: publish_stage,
                        source,
                    })
            })
            .await?;

        info!(task_id = %job.id, kind = ?kind, url = %url, "Artifact published");
        Ok(url)
    }

    async fn timed<T, F>(&self, stage: Stage, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                warn!(stage = %stage, limit = ?limit, "Stage timed out");
                PipelineError::Timeout { stage, limit }
            })?,
            None => fut.await,
        }
    }
}

async fn report<R>(reporter: &R, job: &ClaimedJob, transition: Transition) -> Result<(), PipelineError>
where
    R: StatusReporter + ?Sized,
{
    let status = transition.target();
    reporter
        .report(&job.id, transition)
        .await
        .map_err(|source| PipelineError::Report { status, source })?;
    info!(task_id = %job.id, status = %status, "Transition reported");
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
