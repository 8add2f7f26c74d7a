//! Shared application state.

use std::sync::Arc;

use meshrun_engine::Pipeline;

use crate::config::{Config, ExecutionMode};
use crate::executor::EmbeddedExecutor;
use crate::publish::LocalPublisher;
use crate::store::TaskStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// Tasks indexed by TaskId.
    pub store: Arc<TaskStore>,

    /// Static asset publication (embedded outputs and worker uploads).
    pub publisher: Arc<LocalPublisher>,

    /// Present in embedded mode only.
    pub executor: Option<EmbeddedExecutor>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    ///
    /// `pipeline` is used only in embedded mode.
    pub fn new(config: Config, pipeline: Option<Pipeline>) -> Arc<Self> {
        let store = Arc::new(TaskStore::new());
        let publisher = Arc::new(LocalPublisher::new(
            &config.assets_dir,
            &config.work_dir,
            &config.base_url,
        ));
        let executor = match (config.mode, pipeline) {
            (ExecutionMode::Embedded, Some(pipeline)) => Some(EmbeddedExecutor::new(
                pipeline,
                store.clone(),
                publisher.clone(),
            )),
            _ => None,
        };

        Arc::new(Self {
            config,
            store,
            publisher,
            executor,
        })
    }
}
