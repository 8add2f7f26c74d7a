//! Claim-execute-report loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshrun_core::TaskStatus;
use meshrun_engine::Pipeline;

use crate::client::CoordinatorClient;
use crate::error::ClientError;
use crate::publisher::UploadPublisher;

/// Polls the coordinator and runs claimed jobs one at a time.
pub struct Runner {
    client: Arc<CoordinatorClient>,
    publisher: UploadPublisher,
    pipeline: Pipeline,
    idle_poll: Duration,
    error_backoff: Duration,
}

impl Runner {
    pub fn new(
        client: Arc<CoordinatorClient>,
        publisher: UploadPublisher,
        pipeline: Pipeline,
        idle_poll: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            client,
            publisher,
            pipeline,
            idle_poll,
            error_backoff,
        }
    }

    /// Claim one job and run it to a terminal state.
    ///
    /// Returns `None` when nothing was claimable.
    pub async fn poll_once(&self) -> Result<Option<TaskStatus>, ClientError> {
        let Some(job) = self.client.claim().await? else {
            return Ok(None);
        };

        info!(
            task_id = %job.id,
            worker_id = %self.client.worker_id(),
            "Claimed job"
        );
        let status = self
            .pipeline
            .execute(&job, &self.publisher, self.client.as_ref())
            .await;
        Ok(Some(status))
    }

    /// Run until `shutdown` is cancelled. A job in hand is always finished
    /// before returning. Returns the number of jobs executed.
    pub async fn run(&self, shutdown: CancellationToken) -> usize {
        info!(worker_id = %self.client.worker_id(), "Worker loop started");
        let mut executed = 0;

        while !shutdown.is_cancelled() {
            let delay = match self.poll_once().await {
                Ok(Some(status)) => {
                    executed += 1;
                    info!(status = %status, executed, "Job finished");
                    continue;
                }
                Ok(None) => self.idle_poll,
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = self.error_backoff.as_secs(),
                        "Coordinator request failed"
                    );
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(executed, "Worker loop stopped");
        executed
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use meshrun_control_plane::config::{Config as ControlPlaneConfig, ExecutionMode};
    use meshrun_control_plane::{http, AppState};
    use meshrun_core::{TaskInput, WorkerId};
    use meshrun_engine::{
        DynamicImage, MockBehavior, MockEngine, SharedEngine, Stage, StaticImageSource,
    };

    use super::*;

    async fn control_plane(assets: &Path, api_key: Option<&str>) -> (String, Arc<AppState>) {
        let config = ControlPlaneConfig {
            assets_dir: assets.to_path_buf(),
            base_url: "http://cp".to_string(),
            mode: ExecutionMode::Distributed,
            api_key: api_key.map(str::to_string),
            ..ControlPlaneConfig::default()
        };
        let state = AppState::new(config, None);
        let router = http::create_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        (format!("http://{addr}/api/v1"), state)
    }

    fn runner(api_base: &str, work_dir: &Path, engine: MockEngine, images: StaticImageSource) -> Runner {
        let client = Arc::new(
            CoordinatorClient::new(
                api_base,
                Some("secret".to_string()),
                WorkerId::new("w1"),
                Duration::from_secs(10),
            )
            .unwrap(),
        );
        let publisher = UploadPublisher::new(client.clone(), work_dir);
        let pipeline = Pipeline::new(SharedEngine::new(engine), Arc::new(images));
        Runner::new(
            client,
            publisher,
            pipeline,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )
    }

    fn image() -> StaticImageSource {
        StaticImageSource::new(DynamicImage::new_rgb8(2, 2))
    }

    async fn enqueue(state: &AppState) -> meshrun_core::TaskId {
        let record = state
            .store
            .create(TaskInput::new("https://x/cat.png", None).unwrap())
            .await;
        state.store.make_claimable(&record.id).await;
        record.id
    }

    #[tokio::test]
    async fn test_poll_once_without_jobs() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let (api_base, _state) = control_plane(assets.path(), Some("secret")).await;

        let runner = runner(&api_base, work.path(), MockEngine::new(), image());
        assert_eq!(runner.poll_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_job_runs_to_success() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let (api_base, state) = control_plane(assets.path(), Some("secret")).await;
        let id = enqueue(&state).await;

        let runner = runner(&api_base, work.path(), MockEngine::new(), image());
        assert_eq!(runner.poll_once().await.unwrap(), Some(TaskStatus::Success));

        let view = state.store.get(&id).await.unwrap().view();
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(
            view.preview.as_deref(),
            Some(format!("http://cp/assets/previews/{id}.mp4").as_str())
        );
        assert_eq!(
            view.models.unwrap()["glb"],
            format!("http://cp/assets/models/{id}.glb")
        );
        assert_eq!(state.store.claimed_by(&id).await, Some(WorkerId::new("w1")));

        assert!(assets.path().join(format!("models/{id}.glb")).exists());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let (api_base, state) = control_plane(assets.path(), Some("secret")).await;
        let id = enqueue(&state).await;

        let engine = MockEngine::with_behavior(MockBehavior::FailAt(Stage::ExportModel));
        let runner = runner(&api_base, work.path(), engine, image());
        assert_eq!(runner.poll_once().await.unwrap(), Some(TaskStatus::Failed));

        let view = state.store.get(&id).await.unwrap().view();
        assert_eq!(view.status, TaskStatus::Failed);
        assert!(view.preview.is_some());
        assert_eq!(view.error.unwrap().code, 10001);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let (api_base, state) = control_plane(assets.path(), Some("other")).await;
        enqueue(&state).await;

        let runner = runner(&api_base, work.path(), MockEngine::new(), image());
        match runner.poll_once().await {
            Err(ClientError::Api { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected 401, got {other:?}"),
        }
        assert_eq!(state.store.claimable_count().await, 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops() {
        let assets = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let (api_base, state) = control_plane(assets.path(), Some("secret")).await;
        let first = enqueue(&state).await;
        let second = enqueue(&state).await;

        let runner = Arc::new(runner(&api_base, work.path(), MockEngine::new(), image()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let runner = runner.clone();
            let shutdown = shutdown.clone();
            async move { runner.run(shutdown).await }
        });

        for _ in 0..200 {
            let done = state.store.get(&second).await.unwrap().status().is_terminal();
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();

        let executed = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed, 2);
        for id in [first, second] {
            assert_eq!(
                state.store.get(&id).await.unwrap().status(),
                TaskStatus::Success
            );
        }
    }
}
