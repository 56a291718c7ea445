//! Application services: the event bus, the registry, the scheduler, and the
//! caller-facing tools built on top of them.

pub mod event_bus;
pub mod subagent_registry;
pub mod subagent_scheduler;
pub mod tools;

pub use event_bus::{HierarchicalEventBus, Subscription};
pub use subagent_registry::{DispatchParams, SubagentRegistry, TransitionPatch};
pub use subagent_scheduler::{EmitStream, FnTaskBody, SubagentScheduler, TaskBody, TaskContext};
pub use tools::{
    await_subagent, default_oracle, dispatch_subagent, poll_subagent, AwaitInput, AwaitResult,
    DispatchInput, DispatchOutput, PollInput, PollOutput, PollSummary, TaskSnapshot,
};
