//! Domain error types for the subagent execution core.
//!
//! A single [`SubagentError`] enum covers every failure kind the registry,
//! scheduler, bus, and tools can produce. Each variant carries the structured
//! detail a caller needs; `kind()` gives the stable string used in tool
//! payloads (`{error: <kind>, detail?}`).

use thiserror::Error;

/// Errors produced by the subagent core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubagentError {
    /// Dispatch was attempted at or beyond the configured maximum depth.
    #[error("depth {depth} exceeds maximum depth {max_depth}")]
    DepthExceeded {
        /// Depth the dispatch was attempted at.
        depth: u32,
        /// Configured maximum depth.
        max_depth: u32,
    },

    /// The parent already has `maxConcurrentPerParent` non-terminal children.
    #[error("parent {parent_id} already has {active} active children (limit {limit})")]
    QuotaExceeded {
        /// Parent task id.
        parent_id: String,
        /// Current count of non-terminal children.
        active: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The global queue is at `maxQueueSize`.
    #[error("queue is full ({queued}/{limit})")]
    QueueFull {
        /// Current queued count.
        queued: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A lookup by task id found nothing.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The id that was looked up.
        task_id: String,
    },

    /// `createChild` was called with a namespace already in use.
    #[error("namespace already in use: {namespace}")]
    DuplicateNamespace {
        /// The namespace that collided.
        namespace: String,
    },

    /// `subscribe` was attempted past `maxListenersPerEvent`.
    #[error("too many listeners for event {event_type} (limit {limit})")]
    TooManyListeners {
        /// Event type the caller tried to subscribe to.
        event_type: String,
        /// Configured limit.
        limit: usize,
    },

    /// `onDelegationStart` denied the dispatch.
    #[error("blocked by hook: {reason}")]
    BlockedByHook {
        /// Reason the hook gave for the denial.
        reason: String,
    },
}

impl SubagentError {
    /// Stable machine-readable kind, used as the `error` field of tool payloads.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DepthExceeded { .. } => "DepthExceeded",
            Self::QuotaExceeded { .. } => "QuotaExceeded",
            Self::QueueFull { .. } => "QueueFull",
            Self::NotFound { .. } => "NotFound",
            Self::DuplicateNamespace { .. } => "DuplicateNamespace",
            Self::TooManyListeners { .. } => "TooManyListeners",
            Self::BlockedByHook { .. } => "BlockedByHook",
        }
    }

    /// True for errors that stem from caller-supplied parameters (as opposed
    /// to hook denials, which are a separate policy decision).
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::DepthExceeded { .. }
                | Self::QuotaExceeded { .. }
                | Self::QueueFull { .. }
                | Self::NotFound { .. }
                | Self::DuplicateNamespace { .. }
                | Self::TooManyListeners { .. }
        )
    }

    /// True for errors that are not caller-supplied-parameter errors, i.e.
    /// everything [`is_caller_error`](Self::is_caller_error) doesn't cover.
    pub const fn is_internal(&self) -> bool {
        !self.is_caller_error()
    }
}

/// Result alias used throughout the core.
pub type SubagentResult<T> = Result<T, SubagentError>;
