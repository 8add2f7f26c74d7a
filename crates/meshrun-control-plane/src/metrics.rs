//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use meshrun_core::TaskStatus;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_task_metrics(state, &mut output).await;
    collect_queue_metrics(state, &mut output).await;

    output
}

/// Collect task metrics by status.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = state.store.status_counts().await;

    writeln!(output, "# HELP meshrun_tasks_total Number of tasks by status").ok();
    writeln!(output, "# TYPE meshrun_tasks_total gauge").ok();
    for status in TaskStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(output, "meshrun_tasks_total{{status=\"{status}\"}} {count}").ok();
    }
}

/// Collect claim queue and in-flight execution metrics.
async fn collect_queue_metrics(state: &Arc<AppState>, output: &mut String) {
    let claimable = state.store.claimable_count().await;

    writeln!(
        output,
        "# HELP meshrun_tasks_claimable Number of tasks waiting for a worker"
    )
    .ok();
    writeln!(output, "# TYPE meshrun_tasks_claimable gauge").ok();
    writeln!(output, "meshrun_tasks_claimable {claimable}").ok();

    if let Some(executor) = &state.executor {
        writeln!(
            output,
            "# HELP meshrun_executions_active Number of in-process executions running"
        )
        .ok();
        writeln!(output, "# TYPE meshrun_executions_active gauge").ok();
        writeln!(output, "meshrun_executions_active {}", executor.active()).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ExecutionMode};
    use meshrun_core::{TaskInput, Transition};

    #[tokio::test]
    async fn test_collect_metrics() {
        let config = Config {
            mode: ExecutionMode::Distributed,
            ..Config::default()
        };
        let state = AppState::new(config, None);

        let a = state
            .store
            .create(TaskInput::new("https://x/a.png", None).unwrap())
            .await;
        let b = state
            .store
            .create(TaskInput::new("https://x/b.png", None).unwrap())
            .await;
        state.store.make_claimable(&b.id).await;
        state
            .store
            .apply(&a.id, Transition::failed("boom"))
            .await
            .unwrap();

        let text = collect_metrics(&state).await;
        assert!(text.contains("meshrun_tasks_total{status=\"processing\"} 1"));
        assert!(text.contains("meshrun_tasks_total{status=\"failed\"} 1"));
        assert!(text.contains("meshrun_tasks_total{status=\"success\"} 0"));
        assert!(text.contains("meshrun_tasks_claimable 1"));
        assert!(!text.contains("meshrun_executions_active"));
    }
}
