//! The three caller-facing tools: `dispatch_subagent`, `poll_subagent`, and
//! `await_subagent`. Each is a thin mapping between a wire-shaped
//! input/output pair and the registry's API; none carries policy of its own
//! beyond input validation.

pub mod await_tool;
pub mod dispatch_tool;
pub mod poll_tool;

pub use await_tool::{await_subagent, default_oracle, AwaitInput, AwaitResult};
pub use dispatch_tool::{dispatch_subagent, DispatchInput, DispatchOutput};
pub use poll_tool::{poll_subagent, PollInput, PollOutput, PollSummary, TaskSnapshot};
