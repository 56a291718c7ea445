//! `await_subagent`: blocks on completion across a batch of ids with
//! all-settled semantics, consulting an optional completion oracle.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::{self, Duration};

use crate::domain::models::subagent::SubagentHandle;
use crate::domain::ports::hooks::{NoOpTaskCompleteOracle, TaskCompleteOracle};
use crate::services::subagent_registry::SubagentRegistry;

/// Caller-facing input to `await_subagent`.
#[derive(Debug, Clone)]
pub struct AwaitInput {
    /// Ids to wait on, independently.
    pub task_ids: Vec<String>,
    /// Overall per-task wait budget.
    pub timeout_ms: u64,
    /// How often the completion oracle is consulted. Defaults to 1000ms.
    pub poll_interval_ms: Option<u64>,
}

/// One entry in an `await_subagent` response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AwaitResult {
    /// The id was unknown from the start.
    NotFound {
        /// The id that was looked up.
        task_id: String,
        /// Always `"not_found"`.
        status: &'static str,
    },
    /// A completion oracle declared the task complete without it actually
    /// reaching a terminal status.
    Overridden {
        /// The handle's id.
        task_id: String,
        /// The handle's status at the moment of override (non-terminal).
        status: crate::domain::models::subagent::SubagentStatus,
        /// Always `true`.
        completion_override: bool,
        /// The oracle's stated reason.
        completion_reason: String,
    },
    /// The handle reached a terminal status, or the wait timed out.
    Settled {
        /// The handle's id.
        task_id: String,
        /// Current status: terminal on success, otherwise the status the
        /// handle was in when the overall timeout elapsed.
        status: crate::domain::models::subagent::SubagentStatus,
        /// Set iff `status == Completed`.
        output: Option<String>,
        /// Set iff `status` is a failure-flavored terminal state.
        error: Option<String>,
    },
}

impl AwaitResult {
    fn settled(handle: SubagentHandle) -> Self {
        Self::Settled {
            task_id: handle.task_id,
            status: handle.status,
            output: handle.final_output,
            error: handle.error,
        }
    }
}

/// Waits on `input.task_ids` concurrently; one id's timeout or failure never
/// affects the others.
pub async fn await_subagent(
    registry: &SubagentRegistry,
    oracle: Arc<dyn TaskCompleteOracle>,
    input: AwaitInput,
) -> Vec<AwaitResult> {
    let poll_interval_ms = input.poll_interval_ms.unwrap_or(1000).max(1);
    let timeout_ms = input.timeout_ms;

    let waits = input.task_ids.into_iter().map(|task_id| {
        let oracle = oracle.clone();
        async move { await_one(registry, oracle, task_id, timeout_ms, poll_interval_ms).await }
    });

    join_all(waits).await
}

async fn await_one(
    registry: &SubagentRegistry,
    oracle: Arc<dyn TaskCompleteOracle>,
    task_id: String,
    timeout_ms: u64,
    poll_interval_ms: u64,
) -> AwaitResult {
    let Some(mut current) = registry.get(&task_id).await else {
        return AwaitResult::NotFound {
            task_id,
            status: "not_found",
        };
    };
    if current.status.is_terminal() {
        return AwaitResult::settled(current);
    }

    let deadline = time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut ticker = time::interval(Duration::from_millis(poll_interval_ms));
    ticker.tick().await; // first tick fires immediately

    loop {
        let remaining = deadline.saturating_duration_since(time::Instant::now());
        if remaining.is_zero() {
            return AwaitResult::settled(current);
        }

        tokio::select! {
            result = registry.wait_for_completion(&task_id, remaining.as_millis() as u64) => {
                return AwaitResult::settled(result.unwrap_or(current));
            }
            _ = ticker.tick() => {
                if let Some(reason) = oracle.is_task_complete(&current).await {
                    return AwaitResult::Overridden {
                        task_id: current.task_id,
                        status: current.status,
                        completion_override: true,
                        completion_reason: reason,
                    };
                }
                if let Some(refreshed) = registry.get(&task_id).await {
                    if refreshed.status.is_terminal() {
                        return AwaitResult::settled(refreshed);
                    }
                    current = refreshed;
                }
            }
        }
    }
}

/// Convenience constructor matching a no-op oracle, for callers that don't
/// configure one.
pub fn default_oracle() -> Arc<dyn TaskCompleteOracle> {
    Arc::new(NoOpTaskCompleteOracle)
}
