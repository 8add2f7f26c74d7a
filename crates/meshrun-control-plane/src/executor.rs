//! Background execution of tasks inside the control plane (embedded mode).

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::info;

use meshrun_core::protocol::ClaimedJob;
use meshrun_core::TaskRecord;
use meshrun_engine::Pipeline;

use crate::publish::LocalPublisher;
use crate::store::TaskStore;

/// Runs one tracked execution unit per submitted task.
pub struct EmbeddedExecutor {
    pipeline: Pipeline,
    store: Arc<TaskStore>,
    publisher: Arc<LocalPublisher>,
    tracker: TaskTracker,
}

impl EmbeddedExecutor {
    pub fn new(pipeline: Pipeline, store: Arc<TaskStore>, publisher: Arc<LocalPublisher>) -> Self {
        Self {
            pipeline,
            store,
            publisher,
            tracker: TaskTracker::new(),
        }
    }

    /// Start executing `record`. Returns immediately.
    pub fn spawn(&self, record: &TaskRecord) {
        let job = ClaimedJob {
            id: record.id.clone(),
            input: record.input.clone(),
        };
        let pipeline = self.pipeline.clone();
        let store = self.store.clone();
        let publisher = self.publisher.clone();

        info!(task_id = %job.id, "Scheduling embedded execution");
        self.tracker.spawn(async move {
            let status = pipeline.execute(&job, publisher.as_ref(), store.as_ref()).await;
            info!(task_id = %job.id, status = %status, "Embedded execution finished");
        });
    }

    /// Number of executions still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for in-flight executions.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(active = self.tracker.len(), "Waiting for in-flight executions");
        self.tracker.wait().await;
    }
}
