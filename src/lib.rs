//! An async execution core for dispatching, polling, and awaiting
//! short-lived "subagent" tasks, arranged in a depth-bounded tree.
//!
//! The three layers:
//! - [`domain`]: the handle/state machine, resource limits, error taxonomy,
//!   and the hook/id-generator ports through which an embedding application
//!   injects policy.
//! - [`services`]: the [`services::HierarchicalEventBus`], the
//!   [`services::SubagentRegistry`] (single mutation authority over every
//!   handle), the [`services::SubagentScheduler`] (bounded worker pool), and
//!   the three caller-facing tools (`dispatch_subagent`, `poll_subagent`,
//!   `await_subagent`).
//! - [`infrastructure`]: layered configuration and the structured logging
//!   stack.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::limits::SubagentLimits;
pub use domain::models::subagent::{SubagentHandle, SubagentStatus};
pub use domain::{SubagentError, SubagentResult};
pub use services::{
    await_subagent, dispatch_subagent, poll_subagent, DispatchParams, FnTaskBody,
    HierarchicalEventBus, SubagentRegistry, SubagentScheduler, TaskBody, TaskContext,
    TransitionPatch,
};
