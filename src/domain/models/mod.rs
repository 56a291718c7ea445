//! Domain models
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod limits;
pub mod queue;
pub mod subagent;

pub use limits::SubagentLimits;
pub use queue::{PriorityQueue, QueueKey};
pub use subagent::{SubagentHandle, SubagentStatus};
