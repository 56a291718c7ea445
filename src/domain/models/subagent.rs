//! The subagent handle and its state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::queue::QueueKey;

/// Status of a dispatched subagent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    /// Created and waiting for a worker.
    Queued,
    /// Picked up by a worker and executing.
    Running,
    /// Executing and has emitted at least one partial chunk.
    Streaming,
    /// Finished successfully.
    Completed,
    /// Finished with an error from the task body.
    Failed,
    /// Watchdog fired before the body returned.
    Timeout,
    /// Cancelled, either directly or via cascade from an ancestor.
    Cancelled,
}

impl SubagentStatus {
    /// Stable lowercase name, matching the wire contract.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are absorbing: no further transitions are legal.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// Non-terminal statuses count against concurrency/queue budgets.
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Legal destination statuses from `self`.
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Queued => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Streaming,
                Self::Completed,
                Self::Failed,
                Self::Timeout,
                Self::Cancelled,
            ],
            Self::Streaming => &[
                Self::Streaming,
                Self::Completed,
                Self::Failed,
                Self::Timeout,
                Self::Cancelled,
            ],
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled => &[],
        }
    }

    /// Whether `self -> new_status` is a legal edge in the state machine.
    pub fn can_transition_to(self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// The unit of scheduling: a single dispatched subagent and its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentHandle {
    /// Opaque unique identifier, generated per dispatch.
    pub task_id: String,
    /// The id of the caller; forms a tree with other handles.
    pub parent_id: String,
    /// Non-negative; root dispatches use 0.
    pub depth: u32,
    /// Current state-machine status.
    pub status: SubagentStatus,
    /// Opaque task body descriptor.
    pub prompt: String,
    /// Optional opaque instructions.
    pub instructions: Option<String>,
    /// Lower value = higher priority.
    pub priority: i64,
    /// Optional per-task wall-clock budget.
    pub timeout_ms: Option<u64>,
    /// Appended as streaming chunks arrive; only grows while active.
    pub partial_output: String,
    /// Set iff `status == Completed`.
    pub final_output: Option<String>,
    /// Set iff `status` is a failure-flavored terminal state.
    pub error: Option<String>,
    /// Free-form mapping, never interpreted by the core.
    pub metadata: HashMap<String, Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent status change.
    pub status_changed_at: DateTime<Utc>,

    /// One-shot cancellation signal exposed to the task body. Skipped by
    /// serde: cancellation is an in-process signal, not wire state.
    #[serde(skip, default = "CancellationToken::new")]
    pub cancel_token: CancellationToken,
}

impl QueueKey for SubagentHandle {
    fn queue_key(&self) -> &str {
        &self.task_id
    }
}

impl SubagentHandle {
    /// Builds a fresh handle in `Queued` status.
    pub fn new(
        task_id: String,
        parent_id: String,
        depth: u32,
        prompt: String,
        instructions: Option<String>,
        priority: i64,
        timeout_ms: Option<u64>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            parent_id,
            depth,
            status: SubagentStatus::Queued,
            prompt,
            instructions,
            priority,
            timeout_ms,
            partial_output: String::new(),
            final_output: None,
            error: None,
            metadata,
            created_at: now,
            status_changed_at: now,
            cancel_token: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for status in [
            SubagentStatus::Completed,
            SubagentStatus::Failed,
            SubagentStatus::Timeout,
            SubagentStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
    }

    #[test]
    fn queued_can_only_reach_running_or_cancelled() {
        assert!(SubagentStatus::Queued.can_transition_to(SubagentStatus::Running));
        assert!(SubagentStatus::Queued.can_transition_to(SubagentStatus::Cancelled));
        assert!(!SubagentStatus::Queued.can_transition_to(SubagentStatus::Completed));
        assert!(!SubagentStatus::Queued.can_transition_to(SubagentStatus::Streaming));
    }

    #[test]
    fn streaming_to_streaming_is_idempotent_and_legal() {
        assert!(SubagentStatus::Streaming.can_transition_to(SubagentStatus::Streaming));
    }

    #[test]
    fn new_handle_starts_queued_with_equal_timestamps() {
        let handle = SubagentHandle::new(
            "t1".into(),
            "p1".into(),
            0,
            "do the thing".into(),
            None,
            5,
            None,
            HashMap::new(),
        );
        assert_eq!(handle.status, SubagentStatus::Queued);
        assert_eq!(handle.created_at, handle.status_changed_at);
        assert_eq!(handle.queue_key(), "t1");
        assert!(!handle.cancel_token.is_cancelled());
    }

    const ALL_STATUSES: [SubagentStatus; 7] = [
        SubagentStatus::Queued,
        SubagentStatus::Running,
        SubagentStatus::Streaming,
        SubagentStatus::Completed,
        SubagentStatus::Failed,
        SubagentStatus::Timeout,
        SubagentStatus::Cancelled,
    ];

    use proptest::prelude::*;

    proptest! {
        /// Terminal statuses reject every destination, for any `(from, to)`
        /// pair drawn from the full status set.
        #[test]
        fn proptest_terminal_statuses_reject_every_destination(
            from_index in 0usize..ALL_STATUSES.len(),
            to_index in 0usize..ALL_STATUSES.len(),
        ) {
            let from = ALL_STATUSES[from_index];
            let to = ALL_STATUSES[to_index];
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        /// No status can transition back into `Queued`: once a task leaves
        /// the queue it never returns to it.
        #[test]
        fn proptest_nothing_transitions_into_queued(from_index in 0usize..ALL_STATUSES.len()) {
            let from = ALL_STATUSES[from_index];
            prop_assert!(!from.can_transition_to(SubagentStatus::Queued));
        }

        /// Every non-terminal status has a path to at least one terminal
        /// status, so a task can always eventually settle.
        #[test]
        fn proptest_non_terminal_statuses_can_reach_a_terminal_status(from_index in 0usize..ALL_STATUSES.len()) {
            let from = ALL_STATUSES[from_index];
            if !from.is_terminal() {
                prop_assert!(from.valid_transitions().iter().any(|to| to.is_terminal()));
            }
        }
    }
}
