//! `poll_subagent`: a pure read over the registry, never mutates state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::models::subagent::{SubagentHandle, SubagentStatus};
use crate::services::subagent_registry::SubagentRegistry;

/// Caller-facing input to `poll_subagent`.
#[derive(Debug, Clone)]
pub struct PollInput {
    /// Ids to report on.
    pub task_ids: Vec<String>,
    /// Whether to include (possibly truncated) `partial_output`.
    pub include_partial_output: bool,
    /// Truncates `partial_output` to this many characters, if set.
    pub max_partial_output_length: Option<usize>,
}

/// One entry in a `poll_subagent` response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskSnapshot {
    /// The id is unknown to the registry.
    NotFound {
        /// The id that was looked up.
        task_id: String,
        /// Always `"not_found"`.
        status: &'static str,
    },
    /// A known handle's current state.
    Found {
        /// The handle's id.
        task_id: String,
        /// Current state-machine status.
        status: SubagentStatus,
        /// Set iff `status == Completed`.
        final_output: Option<String>,
        /// Present iff requested; possibly truncated.
        partial_output: Option<String>,
        /// Set iff `status` is a failure-flavored terminal state.
        error: Option<String>,
        /// Dispatch-time priority.
        priority: i64,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Timestamp of the most recent status change.
        status_changed_at: DateTime<Utc>,
    },
}

/// Per-status counts plus the overall total, for a `poll_subagent` response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSummary {
    /// Count of `queued` handles.
    pub queued: usize,
    /// Count of `running` handles.
    pub running: usize,
    /// Count of `streaming` handles.
    pub streaming: usize,
    /// Count of `completed` handles.
    pub completed: usize,
    /// Count of `failed` handles.
    pub failed: usize,
    /// Count of `timeout` handles.
    pub timeout: usize,
    /// Count of `cancelled` handles.
    pub cancelled: usize,
    /// Count of ids that resolved to nothing.
    pub not_found: usize,
    /// Total ids requested.
    pub total: usize,
}

impl PollSummary {
    fn record(&mut self, status: SubagentStatus) {
        match status {
            SubagentStatus::Queued => self.queued += 1,
            SubagentStatus::Running => self.running += 1,
            SubagentStatus::Streaming => self.streaming += 1,
            SubagentStatus::Completed => self.completed += 1,
            SubagentStatus::Failed => self.failed += 1,
            SubagentStatus::Timeout => self.timeout += 1,
            SubagentStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    fn record_not_found(&mut self) {
        self.not_found += 1;
        self.total += 1;
    }
}

/// Full `poll_subagent` response.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutput {
    /// One entry per requested id, in request order.
    pub tasks: Vec<TaskSnapshot>,
    /// Aggregate counters across `tasks`.
    pub summary: PollSummary,
}

fn truncate(output: &str, max_len: Option<usize>) -> String {
    match max_len {
        Some(max_len) if output.chars().count() > max_len => {
            output.chars().take(max_len).collect()
        }
        _ => output.to_string(),
    }
}

fn snapshot(handle: &SubagentHandle, input: &PollInput) -> TaskSnapshot {
    TaskSnapshot::Found {
        task_id: handle.task_id.clone(),
        status: handle.status,
        final_output: handle.final_output.clone(),
        partial_output: input
            .include_partial_output
            .then(|| truncate(&handle.partial_output, input.max_partial_output_length)),
        error: handle.error.clone(),
        priority: handle.priority,
        created_at: handle.created_at,
        status_changed_at: handle.status_changed_at,
    }
}

/// Reports the current state of every id in `input.task_ids`.
pub async fn poll_subagent(registry: &SubagentRegistry, input: PollInput) -> PollOutput {
    let mut tasks = Vec::with_capacity(input.task_ids.len());
    let mut summary = PollSummary::default();

    for task_id in &input.task_ids {
        match registry.get(task_id).await {
            Some(handle) => {
                summary.record(handle.status);
                tasks.push(snapshot(&handle, &input));
            }
            None => {
                summary.record_not_found();
                tasks.push(TaskSnapshot::NotFound {
                    task_id: task_id.clone(),
                    status: "not_found",
                });
            }
        }
    }

    PollOutput { tasks, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::limits::SubagentLimits;
    use crate::services::event_bus::HierarchicalEventBus;
    use crate::services::subagent_registry::{DispatchParams, TransitionPatch};
    use crate::domain::models::subagent::SubagentStatus;

    fn registry() -> SubagentRegistry {
        let bus = HierarchicalEventBus::new("poll-tool-test", SubagentLimits::default());
        SubagentRegistry::new(SubagentLimits::default(), bus)
    }

    fn input(task_ids: Vec<String>) -> PollInput {
        PollInput {
            task_ids,
            include_partial_output: false,
            max_partial_output_length: None,
        }
    }

    #[tokio::test]
    async fn unknown_id_reports_not_found_without_breaking_the_batch() {
        let registry = registry();
        let handle = registry
            .dispatch(
                "root",
                0,
                DispatchParams {
                    prompt: "a".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let output = poll_subagent(&registry, input(vec![handle.task_id.clone(), "ghost".into()]))
            .await;

        assert_eq!(output.summary.total, 2);
        assert_eq!(output.summary.queued, 1);
        assert_eq!(output.summary.not_found, 1);
        assert!(matches!(output.tasks[1], TaskSnapshot::NotFound { .. }));
    }

    #[tokio::test]
    async fn partial_output_is_omitted_unless_requested() {
        let registry = registry();
        let handle = registry
            .dispatch(
                "root",
                0,
                DispatchParams {
                    prompt: "a".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        registry
            .transition(&handle.task_id, SubagentStatus::Running, TransitionPatch::default())
            .await;
        registry
            .transition(
                &handle.task_id,
                SubagentStatus::Streaming,
                TransitionPatch {
                    partial_chunk: Some("hello world".into()),
                    ..Default::default()
                },
            )
            .await;

        let without = poll_subagent(&registry, input(vec![handle.task_id.clone()])).await;
        match &without.tasks[0] {
            TaskSnapshot::Found { partial_output, .. } => assert!(partial_output.is_none()),
            _ => panic!("expected Found"),
        }

        let mut with_partial = input(vec![handle.task_id.clone()]);
        with_partial.include_partial_output = true;
        with_partial.max_partial_output_length = Some(5);
        let truncated = poll_subagent(&registry, with_partial).await;
        match &truncated.tasks[0] {
            TaskSnapshot::Found { partial_output, .. } => {
                assert_eq!(partial_output.as_deref(), Some("hello"));
            }
            _ => panic!("expected Found"),
        }
    }

    #[tokio::test]
    async fn poll_never_mutates_registry_state() {
        let registry = registry();
        let handle = registry
            .dispatch(
                "root",
                0,
                DispatchParams {
                    prompt: "a".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        poll_subagent(&registry, input(vec![handle.task_id.clone()])).await;

        assert_eq!(registry.queued_count().await, 1);
        assert_eq!(
            registry.get(&handle.task_id).await.unwrap().status,
            SubagentStatus::Queued
        );
    }
}
