//! In-memory task store: the single synchronization point for task state.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use meshrun_core::protocol::ClaimedJob;
use meshrun_core::{CoreError, TaskId, TaskInput, TaskRecord, TaskStatus, Transition, WorkerId};
use meshrun_engine::{ReportError, StatusReporter};

/// Task store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task {0} has not been claimed")]
    NotClaimed(TaskId),

    #[error("task {task_id} is claimed by another worker than {worker_id}")]
    NotOwner { task_id: TaskId, worker_id: WorkerId },

    #[error(transparent)]
    Transition(#[from] CoreError),
}

struct TaskEntry {
    record: TaskRecord,

    /// Worker holding the claim, in distributed mode.
    claimed_by: Option<WorkerId>,
}

/// Maps task ids to their current record.
///
/// Every mutation replaces a record's whole state inside one write section
/// with no `.await` in between, so readers only ever see committed states.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,

    /// Claimable task ids, oldest first.
    pending: Mutex<VecDeque<TaskId>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Processing` record.
    pub async fn create(&self, input: TaskInput) -> TaskRecord {
        self.insert(TaskRecord::new(input)).await
    }

    /// Insert a pre-built record (tests pin ids this way).
    pub async fn insert(&self, record: TaskRecord) -> TaskRecord {
        info!(
            task_id = %record.id,
            image_url = %record.input.image_url,
            segm_mode = %record.input.segm_mode,
            "Task created"
        );
        self.tasks.write().await.insert(
            record.id.clone(),
            TaskEntry {
                record: record.clone(),
                claimed_by: None,
            },
        );
        record
    }

    /// Queue a task for workers to claim.
    pub async fn make_claimable(&self, task_id: &TaskId) {
        self.pending.lock().await.push_back(task_id.clone());
        debug!(task_id = %task_id, "Task queued for claiming");
    }

    /// Latest committed snapshot of a task.
    pub async fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.record.clone())
    }

    /// Apply a transition on behalf of the embedded executor.
    pub async fn apply(
        &self,
        task_id: &TaskId,
        transition: Transition,
    ) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.clone()))?;
        commit(entry, transition)
    }

    /// Apply a transition reported by a worker; only the claim holder may do so.
    pub async fn apply_as(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        transition: Transition,
    ) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.clone()))?;

        match &entry.claimed_by {
            None => return Err(StoreError::NotClaimed(task_id.clone())),
            Some(owner) if owner != worker_id => {
                warn!(
                    task_id = %task_id,
                    owner = %owner,
                    worker_id = %worker_id,
                    "Report from non-owner rejected"
                );
                return Err(StoreError::NotOwner {
                    task_id: task_id.clone(),
                    worker_id: worker_id.clone(),
                });
            }
            Some(_) => {}
        }

        commit(entry, transition)
    }

    /// Hand the oldest unclaimed task to `worker_id`.
    ///
    /// The id is popped under the queue lock and the owner is set only if
    /// still empty, so each task is handed to at most one worker.
    pub async fn claim(&self, worker_id: &WorkerId) -> Option<ClaimedJob> {
        loop {
            let task_id = self.pending.lock().await.pop_front()?;

            let mut tasks = self.tasks.write().await;
            let Some(entry) = tasks.get_mut(&task_id) else {
                continue;
            };
            if entry.claimed_by.is_some() || entry.record.status() != TaskStatus::Processing {
                continue;
            }

            entry.claimed_by = Some(worker_id.clone());
            info!(task_id = %task_id, worker_id = %worker_id, "Task claimed");

            return Some(ClaimedJob {
                id: task_id,
                input: entry.record.input.clone(),
            });
        }
    }

    /// Owner of a task's claim, if any.
    pub async fn claimed_by(&self, task_id: &TaskId) -> Option<WorkerId> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .and_then(|entry| entry.claimed_by.clone())
    }

    /// Number of tasks waiting to be claimed.
    pub async fn claimable_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Number of tasks per status.
    pub async fn status_counts(&self) -> HashMap<TaskStatus, u64> {
        let tasks = self.tasks.read().await;
        let mut counts: HashMap<TaskStatus, u64> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for entry in tasks.values() {
            *counts.entry(entry.record.status()).or_default() += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

fn commit(entry: &mut TaskEntry, transition: Transition) -> Result<TaskRecord, StoreError> {
    let from = entry.record.status();
    if let Err(e) = entry.record.apply(transition) {
        warn!(task_id = %entry.record.id, error = %e, "Transition rejected");
        return Err(e.into());
    }
    info!(
        task_id = %entry.record.id,
        from = %from,
        to = %entry.record.status(),
        "Task transitioned"
    );
    Ok(entry.record.clone())
}

#[async_trait]
impl StatusReporter for TaskStore {
    async fn report(&self, task_id: &TaskId, transition: Transition) -> Result<(), ReportError> {
        self.apply(task_id, transition)
            .await
            .map(|_| ())
            .map_err(|e| ReportError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use meshrun_core::TaskState;

    fn input(url: &str) -> TaskInput {
        TaskInput::new(url, None).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = TaskStore::new();
        let record = store.create(input("https://x/cat.png")).await;

        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.status(), TaskStatus::Processing);
        assert_eq!(fetched.input.segm_mode, "auto");
        assert!(store.get(&TaskId::new("never-issued")).await.is_none());
    }

    #[tokio::test]
    async fn test_apply_unknown_task() {
        let store = TaskStore::new();
        let err = store
            .apply(&TaskId::new("nope"), Transition::failed("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = TaskStore::new();
        let id = store.create(input("https://x/cat.png")).await.id;

        store.apply(&id, Transition::failed("download")).await.unwrap();
        let err = store
            .apply(&id, Transition::Preview { preview: "p".into() })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transition(CoreError::InvalidStateTransition { .. })
        ));
        assert_eq!(store.get(&id).await.unwrap().status(), TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_claim_in_submission_order() {
        let store = TaskStore::new();
        let first = store.create(input("https://x/1.png")).await.id;
        let second = store.create(input("https://x/2.png")).await.id;
        store.make_claimable(&first).await;
        store.make_claimable(&second).await;

        let worker = WorkerId::new("w1");
        assert_eq!(store.claim(&worker).await.unwrap().id, first);
        assert_eq!(store.claim(&worker).await.unwrap().id, second);
        assert!(store.claim(&worker).await.is_none());
    }

    #[tokio::test]
    async fn test_claim_skips_non_processing_tasks() {
        let store = TaskStore::new();
        let id = store.create(input("https://x/cat.png")).await.id;
        store.make_claimable(&id).await;
        store.make_claimable(&id).await;
        store.apply(&id, Transition::failed("gone")).await.unwrap();

        assert!(store.claim(&WorkerId::new("w1")).await.is_none());
        assert_eq!(store.claimable_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_queue_entry_claimed_once() {
        let store = TaskStore::new();
        let id = store.create(input("https://x/cat.png")).await.id;
        store.make_claimable(&id).await;
        store.make_claimable(&id).await;

        assert!(store.claim(&WorkerId::new("w1")).await.is_some());
        assert!(store.claim(&WorkerId::new("w2")).await.is_none());
        assert_eq!(store.claimed_by(&id).await, Some(WorkerId::new("w1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_hand_out_job_once() {
        for _ in 0..50 {
            let store = Arc::new(TaskStore::new());
            let id = store.create(input("https://x/cat.png")).await.id;
            store.make_claimable(&id).await;

            let handles: Vec<_> = ["w1", "w2"]
                .into_iter()
                .map(|w| {
                    let store = store.clone();
                    tokio::spawn(async move { store.claim(&WorkerId::new(w)).await })
                })
                .collect();

            let mut winners = Vec::new();
            for handle in handles {
                if let Some(job) = handle.await.unwrap() {
                    winners.push(job);
                }
            }

            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].input.image_url, "https://x/cat.png");
        }
    }

    #[tokio::test]
    async fn test_only_owner_may_report() {
        let store = TaskStore::new();
        let id = store.create(input("https://x/cat.png")).await.id;
        let preview = Transition::Preview { preview: "p".into() };

        let err = store
            .apply_as(&id, &WorkerId::new("w1"), preview.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotClaimed(_)));

        store.make_claimable(&id).await;
        store.claim(&WorkerId::new("w1")).await.unwrap();

        let err = store
            .apply_as(&id, &WorkerId::new("w2"), preview.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotOwner { .. }));

        let record = store
            .apply_as(&id, &WorkerId::new("w1"), preview)
            .await
            .unwrap();
        assert_eq!(record.state, TaskState::Preview { preview: "p".into() });
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_transitions() {
        let store = Arc::new(TaskStore::new());
        let id = store.create(input("https://x/cat.png")).await.id;

        let reader = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..1000 {
                    let view = store.get(&id).await.unwrap().view();
                    match view.status {
                        TaskStatus::Preview => assert!(view.preview.is_some()),
                        TaskStatus::Success => {
                            assert!(view.error.is_none());
                            assert!(view.models.is_some());
                        }
                        _ => {}
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        store
            .apply(&id, Transition::Preview { preview: "p".into() })
            .await
            .unwrap();
        store
            .apply(&id, Transition::success_glb("m"))
            .await
            .unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_counts() {
        let store = TaskStore::new();
        let a = store.create(input("https://x/a.png")).await.id;
        store.create(input("https://x/b.png")).await;
        store.apply(&a, Transition::failed("x")).await.unwrap();

        let counts = store.status_counts().await;
        assert_eq!(counts[&TaskStatus::Processing], 1);
        assert_eq!(counts[&TaskStatus::Failed], 1);
        assert_eq!(counts[&TaskStatus::Success], 0);
        assert_eq!(store.len().await, 2);
    }
}
