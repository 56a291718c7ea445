//! Resource budgets enforced by the registry, scheduler, and bus.

use serde::{Deserialize, Serialize};

/// Tunable caps for the subagent core. Defaults match the reference
/// contract; every field can be overridden through [`crate::infrastructure::config`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentLimits {
    /// Maximum tree depth; a dispatch at `depth >= max_depth` is rejected.
    pub max_depth: u32,
    /// Maximum non-terminal children per parent.
    pub max_concurrent_per_parent: usize,
    /// Maximum total queued (not yet running) handles.
    pub max_queue_size: usize,
    /// Time-to-live, after a handle goes terminal, before GC removes it.
    pub gc_ttl_ms: u64,
    /// Interval between automatic GC sweeps.
    pub gc_interval_ms: u64,
    /// Default per-task timeout when a dispatch does not specify one.
    pub default_task_timeout_ms: Option<u64>,
    /// Worker pool size for the scheduler.
    pub worker_pool_size: usize,
    /// Anti-storm cap on bubbled emissions per bus per second.
    pub max_bubbles_per_second: u32,
    /// Maximum listeners permitted per event type (or wildcard) per bus.
    pub max_listeners_per_event: usize,
}

impl Default for SubagentLimits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_concurrent_per_parent: 10,
            max_queue_size: 1000,
            gc_ttl_ms: 60_000,
            gc_interval_ms: 30_000,
            default_task_timeout_ms: None,
            worker_pool_size: 8,
            max_bubbles_per_second: 100,
            max_listeners_per_event: 100,
        }
    }
}

impl SubagentLimits {
    /// Rejects configurations that can never make progress.
    ///
    /// # Errors
    /// Returns a description of the first invalid field encountered.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        if self.max_concurrent_per_parent == 0 {
            return Err("max_concurrent_per_parent must be at least 1".to_string());
        }
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be at least 1".to_string());
        }
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be at least 1".to_string());
        }
        if self.max_listeners_per_event == 0 {
            return Err("max_listeners_per_event must be at least 1".to_string());
        }
        if self.gc_interval_ms == 0 {
            return Err("gc_interval_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_contract() {
        let limits = SubagentLimits::default();
        assert_eq!(limits.max_depth, 5);
        assert_eq!(limits.max_concurrent_per_parent, 10);
        assert_eq!(limits.max_queue_size, 1000);
        assert_eq!(limits.gc_ttl_ms, 60_000);
        assert_eq!(limits.gc_interval_ms, 30_000);
        assert_eq!(limits.worker_pool_size, 8);
        assert_eq!(limits.max_bubbles_per_second, 100);
        assert_eq!(limits.max_listeners_per_event, 100);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let limits = SubagentLimits {
            max_depth: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let limits = SubagentLimits {
            worker_pool_size: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }
}
