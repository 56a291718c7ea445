//! Hook ports: independent, optional capabilities injected at construction.
//!
//! Each hook defaults to a no-op implementation so the core is fully
//! functional with none configured. Hook errors are isolated per §7 of the
//! governing design: a failing `onDelegationStart` denies the dispatch, a
//! failing `onDelegationComplete` is logged and swallowed, and a failing
//! `isTaskComplete` is treated as "no override".

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::models::subagent::SubagentHandle;

/// Outcome of a pre-dispatch policy check.
#[derive(Debug, Clone)]
pub enum DelegationDecision {
    /// Dispatch proceeds, optionally with caller-supplied fields overridden.
    Allow {
        /// Fields to merge over the caller-supplied dispatch params.
        overrides: DelegationOverrides,
    },
    /// Dispatch is denied; no handle is created.
    Deny {
        /// Human-readable reason surfaced as `BlockedByHook`.
        reason: String,
    },
}

/// Fields an `onDelegationStart` hook may rewrite before dispatch proceeds.
#[derive(Debug, Clone, Default)]
pub struct DelegationOverrides {
    /// Replacement prompt.
    pub prompt: Option<String>,
    /// Replacement priority.
    pub priority: Option<i64>,
    /// Replacement metadata.
    pub metadata: Option<HashMap<String, Value>>,
    /// Replacement instructions.
    pub instructions: Option<String>,
    /// Replacement timeout.
    pub timeout_ms: Option<u64>,
}

/// Parameters a caller supplies to `dispatch_subagent`, before any hook runs.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    /// Id of the dispatching parent task (or a session root id).
    pub parent_id: String,
    /// Depth the dispatch would occur at.
    pub depth: u32,
    /// Requested prompt.
    pub prompt: String,
    /// Requested instructions.
    pub instructions: Option<String>,
    /// Requested priority.
    pub priority: i64,
    /// Requested timeout.
    pub timeout_ms: Option<u64>,
    /// Requested metadata.
    pub metadata: HashMap<String, Value>,
}

/// Invoked before a dispatch is committed to the registry.
#[async_trait]
pub trait DelegationStartHook: Send + Sync {
    /// Decide whether the dispatch may proceed, and how to rewrite it.
    async fn on_delegation_start(&self, request: &DelegationRequest) -> DelegationDecision;
}

/// No-op default: every dispatch is allowed unmodified.
pub struct NoOpDelegationStartHook;

#[async_trait]
impl DelegationStartHook for NoOpDelegationStartHook {
    async fn on_delegation_start(&self, _request: &DelegationRequest) -> DelegationDecision {
        DelegationDecision::Allow {
            overrides: DelegationOverrides::default(),
        }
    }
}

/// Invoked once a handle reaches a terminal state. Fire-and-forget: errors
/// are logged by the registry and never propagated.
#[async_trait]
pub trait DelegationCompleteHook: Send + Sync {
    /// Observe a handle's terminal snapshot.
    async fn on_delegation_complete(&self, handle: &SubagentHandle);
}

/// No-op default.
pub struct NoOpDelegationCompleteHook;

#[async_trait]
impl DelegationCompleteHook for NoOpDelegationCompleteHook {
    async fn on_delegation_complete(&self, _handle: &SubagentHandle) {}
}

/// An externally supplied predicate that can declare a running task
/// "complete enough" without transitioning it, consulted by `AwaitTool`.
#[async_trait]
pub trait TaskCompleteOracle: Send + Sync {
    /// Returns `Some(reason)` if the task should be treated as
    /// complete-by-override; `None` to keep waiting.
    async fn is_task_complete(&self, handle: &SubagentHandle) -> Option<String>;
}

/// No-op default: never overrides.
pub struct NoOpTaskCompleteOracle;

#[async_trait]
impl TaskCompleteOracle for NoOpTaskCompleteOracle {
    async fn is_task_complete(&self, _handle: &SubagentHandle) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_handle() -> SubagentHandle {
        SubagentHandle::new(
            "t1".into(),
            "p1".into(),
            0,
            "do it".into(),
            None,
            5,
            None,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn noop_start_hook_allows_unmodified() {
        let hook = NoOpDelegationStartHook;
        let request = DelegationRequest {
            parent_id: "p1".into(),
            depth: 0,
            prompt: "x".into(),
            instructions: None,
            priority: 5,
            timeout_ms: None,
            metadata: HashMap::new(),
        };
        match hook.on_delegation_start(&request).await {
            DelegationDecision::Allow { overrides } => {
                assert!(overrides.prompt.is_none());
            }
            DelegationDecision::Deny { .. } => panic!("expected allow"),
        }
    }

    #[tokio::test]
    async fn noop_complete_hook_does_nothing_observable() {
        let hook = NoOpDelegationCompleteHook;
        hook.on_delegation_complete(&sample_handle()).await;
    }

    #[tokio::test]
    async fn noop_oracle_never_overrides() {
        let oracle = NoOpTaskCompleteOracle;
        assert!(oracle.is_task_complete(&sample_handle()).await.is_none());
    }
}
