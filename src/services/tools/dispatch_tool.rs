//! `dispatch_subagent`: the only tool that creates a handle.
//!
//! Hook consultation (`onDelegationStart`) already happens inside
//! [`SubagentRegistry::dispatch`]; this tool is a thin mapping from the
//! caller-facing payload to [`DispatchParams`] and back to the wire shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::SubagentError;
use crate::services::subagent_registry::{DispatchParams, SubagentRegistry};

/// Caller-facing input to `dispatch_subagent`.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchInput {
    /// Required, non-empty task body descriptor.
    pub prompt: String,
    /// Optional opaque instructions.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Lower value = higher priority; defaults to 5 inside the registry.
    #[serde(default)]
    pub priority: Option<i64>,
    /// Per-task wall-clock budget override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Free-form metadata, never interpreted by the core.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Result of a `dispatch_subagent` call.
#[derive(Debug, Clone, Serialize)]
#[allow(clippy::large_enum_variant)]
#[serde(untagged)]
pub enum DispatchOutput {
    /// A handle was created and queued.
    Queued {
        /// The new handle's id.
        task_id: String,
        /// Always `"queued"`.
        status: &'static str,
        /// Human-readable confirmation.
        message: String,
    },
    /// `onDelegationStart` denied the dispatch; no handle was created.
    Blocked {
        /// Always `true`.
        blocked: bool,
        /// The hook's reason.
        error: String,
    },
    /// The registry rejected the dispatch for a non-hook reason.
    Error {
        /// Stable error kind, e.g. `"DepthExceeded"`.
        error: String,
    },
}

/// Dispatches a subagent on behalf of `parent_id` at `depth`.
pub async fn dispatch_subagent(
    registry: &SubagentRegistry,
    parent_id: &str,
    depth: u32,
    input: DispatchInput,
) -> DispatchOutput {
    if input.prompt.trim().is_empty() {
        return DispatchOutput::Error {
            error: "prompt must not be empty".to_string(),
        };
    }

    let params = DispatchParams {
        prompt: input.prompt,
        instructions: input.instructions,
        priority: input.priority,
        timeout_ms: input.timeout_ms,
        metadata: input.metadata,
    };

    match registry.dispatch(parent_id, depth, params).await {
        Ok(handle) => DispatchOutput::Queued {
            task_id: handle.task_id.clone(),
            status: "queued",
            message: format!("subagent {} queued", handle.task_id),
        },
        Err(SubagentError::BlockedByHook { reason }) => DispatchOutput::Blocked {
            blocked: true,
            error: reason,
        },
        Err(err) => DispatchOutput::Error {
            error: format!("{}:{}", err.kind(), err),
        },
    }
}
