//! Authoritative owner of subagent handles.
//!
//! The registry is the single mutation authority for every handle: the
//! scheduler, the tools, and cancellation all go through it. It drives the
//! state machine, enforces depth/concurrency/queue budgets, propagates
//! cancellation through the parent→child tree, and garbage-collects
//! handles a configurable time after they go terminal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::{SubagentError, SubagentResult};
use crate::domain::models::limits::SubagentLimits;
use crate::domain::models::queue::{PriorityQueue, QueueKey};
use crate::domain::models::subagent::{SubagentHandle, SubagentStatus};
use crate::domain::ports::hooks::{DelegationCompleteHook, DelegationDecision, DelegationRequest};
use crate::domain::ports::id_generator::TaskIdGenerator;
use crate::domain::ports::{NoOpDelegationCompleteHook, NoOpDelegationStartHook};
use crate::services::event_bus::HierarchicalEventBus;

/// Caller-supplied parameters for a dispatch, before any hook runs.
#[derive(Debug, Clone, Default)]
pub struct DispatchParams {
    /// Opaque task body descriptor. Must be non-empty.
    pub prompt: String,
    /// Optional opaque instructions.
    pub instructions: Option<String>,
    /// Lower value = higher priority. Defaults to 5 if unset by the caller.
    pub priority: Option<i64>,
    /// Per-task wall-clock budget; falls back to the registry default.
    pub timeout_ms: Option<u64>,
    /// Free-form metadata, never interpreted by the core.
    pub metadata: HashMap<String, Value>,
}

/// Fields a transition may legally set, depending on the destination status.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    /// Appended to `partial_output` (valid entering `Streaming`).
    pub partial_chunk: Option<String>,
    /// Set as `final_output` (valid entering `Completed`).
    pub final_output: Option<String>,
    /// Set as `error` (valid entering `Failed`/`Timeout`/`Cancelled`).
    pub error: Option<String>,
}

#[derive(Clone)]
struct QueuedRef {
    task_id: String,
}

impl QueueKey for QueuedRef {
    fn queue_key(&self) -> &str {
        &self.task_id
    }
}

struct Inner {
    limits: SubagentLimits,
    id_generator: Box<dyn TaskIdGenerator>,
    bus: HierarchicalEventBus,
    start_hook: Arc<dyn crate::domain::ports::hooks::DelegationStartHook>,
    complete_hook: Arc<dyn DelegationCompleteHook>,
    handles: RwLock<HashMap<String, SubagentHandle>>,
    children: RwLock<HashMap<String, HashSet<String>>>,
    queue: RwLock<PriorityQueue<QueuedRef>>,
    transitions: broadcast::Sender<SubagentHandle>,
    work_available: Notify,
    shutdown: CancellationToken,
}

/// Owns every subagent handle for one session.
#[derive(Clone)]
pub struct SubagentRegistry(Arc<Inner>);

impl SubagentRegistry {
    /// Builds a registry with no-op hooks and a UUID id generator.
    pub fn new(limits: SubagentLimits, bus: HierarchicalEventBus) -> Self {
        Self::with_hooks(
            limits,
            bus,
            Box::new(crate::domain::ports::UuidTaskIdGenerator),
            Arc::new(NoOpDelegationStartHook),
            Arc::new(NoOpDelegationCompleteHook),
        )
    }

    /// Builds a registry with explicit hook and id-generator implementations.
    pub fn with_hooks(
        limits: SubagentLimits,
        bus: HierarchicalEventBus,
        id_generator: Box<dyn TaskIdGenerator>,
        start_hook: Arc<dyn crate::domain::ports::hooks::DelegationStartHook>,
        complete_hook: Arc<dyn DelegationCompleteHook>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(1024);
        Self(Arc::new(Inner {
            limits,
            id_generator,
            bus,
            start_hook,
            complete_hook,
            handles: RwLock::new(HashMap::new()),
            children: RwLock::new(HashMap::new()),
            queue: RwLock::new(PriorityQueue::new()),
            transitions,
            work_available: Notify::new(),
            shutdown: CancellationToken::new(),
        }))
    }

    /// The configured resource budgets.
    pub fn limits(&self) -> SubagentLimits {
        self.0.limits
    }

    /// The event bus this registry publishes lifecycle events to.
    pub fn bus(&self) -> &HierarchicalEventBus {
        &self.0.bus
    }

    /// Notified whenever a handle is enqueued, or on shutdown.
    pub fn work_available(&self) -> &Notify {
        &self.0.work_available
    }

    /// Cancellation token observed by the scheduler's worker loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.0.shutdown.clone()
    }

    async fn active_count_for(&self, parent_id: &str) -> usize {
        self.0
            .handles
            .read()
            .await
            .values()
            .filter(|h| h.parent_id == parent_id && h.status.is_active())
            .count()
    }

    /// Consults `onDelegationStart` before checking resource caps, then
    /// registers a new handle in `Queued`, emitting `subagent:spawn` and
    /// `delegation:start`.
    ///
    /// # Errors
    /// [`SubagentError::BlockedByHook`] if a configured `onDelegationStart`
    /// hook denies the dispatch, otherwise [`SubagentError::DepthExceeded`],
    /// [`SubagentError::QuotaExceeded`], or [`SubagentError::QueueFull`] if
    /// the dispatch exceeds a configured cap.
    #[instrument(skip(self, params), fields(parent_id, depth))]
    pub async fn dispatch(
        &self,
        parent_id: &str,
        depth: u32,
        params: DispatchParams,
    ) -> SubagentResult<SubagentHandle> {
        let request = DelegationRequest {
            parent_id: parent_id.to_string(),
            depth,
            prompt: params.prompt.clone(),
            instructions: params.instructions.clone(),
            priority: params.priority.unwrap_or(5),
            timeout_ms: params.timeout_ms.or(self.0.limits.default_task_timeout_ms),
            metadata: params.metadata.clone(),
        };
        let mut final_request = request.clone();
        match self.0.start_hook.on_delegation_start(&request).await {
            DelegationDecision::Deny { reason } => {
                warn!(parent_id, reason = %reason, "dispatch denied by hook");
                return Err(SubagentError::BlockedByHook { reason });
            }
            DelegationDecision::Allow { overrides } => {
                if let Some(prompt) = overrides.prompt {
                    final_request.prompt = prompt;
                }
                if let Some(priority) = overrides.priority {
                    final_request.priority = priority;
                }
                if let Some(metadata) = overrides.metadata {
                    final_request.metadata = metadata;
                }
                if let Some(instructions) = overrides.instructions {
                    final_request.instructions = Some(instructions);
                }
                if let Some(timeout_ms) = overrides.timeout_ms {
                    final_request.timeout_ms = Some(timeout_ms);
                }
            }
        }

        if depth >= self.0.limits.max_depth {
            return Err(SubagentError::DepthExceeded {
                depth,
                max_depth: self.0.limits.max_depth,
            });
        }

        let active = self.active_count_for(parent_id).await;
        if active >= self.0.limits.max_concurrent_per_parent {
            return Err(SubagentError::QuotaExceeded {
                parent_id: parent_id.to_string(),
                active,
                limit: self.0.limits.max_concurrent_per_parent,
            });
        }

        let queued = self.0.queue.read().await.len();
        if queued >= self.0.limits.max_queue_size {
            return Err(SubagentError::QueueFull {
                queued,
                limit: self.0.limits.max_queue_size,
            });
        }

        let task_id = self.0.id_generator.generate();
        let handle = SubagentHandle::new(
            task_id.clone(),
            parent_id.to_string(),
            depth,
            final_request.prompt,
            final_request.instructions,
            final_request.priority,
            final_request.timeout_ms,
            final_request.metadata,
        );

        self.0
            .handles
            .write()
            .await
            .insert(task_id.clone(), handle.clone());
        self.0
            .children
            .write()
            .await
            .entry(parent_id.to_string())
            .or_default()
            .insert(task_id.clone());
        self.0
            .queue
            .write()
            .await
            .enqueue(QueuedRef { task_id: task_id.clone() }, handle.priority);
        self.0.work_available.notify_one();

        info!(task_id = %task_id, parent_id, depth, "subagent dispatched");

        self.0.bus.emit(
            "subagent:spawn",
            serde_json::json!({
                "taskId": task_id,
                "parentId": parent_id,
                "depth": depth,
                "prompt": handle.prompt,
                "priority": handle.priority,
            }),
        );
        self.0.bus.emit(
            "delegation:start",
            serde_json::json!({
                "taskId": task_id,
                "parentId": parent_id,
                "prompt": handle.prompt,
            }),
        );

        Ok(handle)
    }

    /// Pulls the highest-priority queued handle's id, if any, for a worker
    /// to pick up. Does not itself transition the handle.
    pub async fn pull_next(&self) -> Option<String> {
        self.0.queue.write().await.dequeue().map(|queued| queued.task_id)
    }

    /// Applies a state-machine edge. No-ops (returning the unchanged handle)
    /// if the handle is unknown, already terminal, or the edge is illegal.
    #[instrument(skip(self, patch), fields(task_id))]
    pub async fn transition(
        &self,
        task_id: &str,
        new_status: SubagentStatus,
        patch: TransitionPatch,
    ) -> Option<SubagentHandle> {
        let mut handles = self.0.handles.write().await;
        let handle = handles.get_mut(task_id)?;

        if handle.status.is_terminal() || !handle.status.can_transition_to(new_status) {
            return Some(handle.clone());
        }

        let from = handle.status;
        handle.status = new_status;
        handle.status_changed_at = Utc::now();
        if let Some(chunk) = patch.partial_chunk {
            handle.partial_output.push_str(&chunk);
        }
        if new_status == SubagentStatus::Completed {
            handle.final_output = patch.final_output;
        }
        if matches!(
            new_status,
            SubagentStatus::Failed | SubagentStatus::Timeout | SubagentStatus::Cancelled
        ) {
            handle.error = patch.error;
        }
        let snapshot = handle.clone();
        drop(handles);

        debug!(task_id, ?from, ?new_status, "subagent transitioned");
        let _ = self.0.transitions.send(snapshot.clone());
        self.0.bus.emit(
            "subagent:status-change",
            serde_json::json!({
                "taskId": task_id,
                "from": from.as_str(),
                "to": new_status.as_str(),
                "at": snapshot.status_changed_at,
            }),
        );

        if new_status.is_terminal() {
            self.0.queue.write().await.remove(task_id);
            self.0.bus.emit(
                "subagent:complete",
                serde_json::json!({
                    "taskId": task_id,
                    "status": new_status.as_str(),
                    "finalOutput": snapshot.final_output,
                    "error": snapshot.error,
                }),
            );
            self.0.bus.emit(
                "delegation:complete",
                serde_json::json!({
                    "taskId": task_id,
                    "parentId": snapshot.parent_id,
                    "status": new_status.as_str(),
                    "finalOutput": snapshot.final_output,
                    "error": snapshot.error,
                }),
            );
            let hook = self.0.complete_hook.clone();
            let for_hook = snapshot.clone();
            tokio::spawn(async move {
                hook.on_delegation_complete(&for_hook).await;
            });
        }

        Some(snapshot)
    }

    /// Cancels `task_id` and every descendant reachable through the
    /// parent→children index. Returns `false` if the handle is unknown or
    /// already terminal.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: &str, reason: Option<String>) -> bool {
        let Some(handle) = self.0.handles.read().await.get(task_id).cloned() else {
            return false;
        };
        if handle.status.is_terminal() {
            return false;
        }

        handle.cancel_token.cancel();
        self.transition(
            task_id,
            SubagentStatus::Cancelled,
            TransitionPatch {
                error: Some(reason.clone().unwrap_or_else(|| "cancelled".to_string())),
                ..Default::default()
            },
        )
        .await;

        let children: Vec<String> = self
            .0
            .children
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for child_id in children {
            Box::pin(self.cancel(&child_id, reason.clone())).await;
        }

        true
    }

    /// Cancels every non-terminal handle whose `parentId` matches.
    pub async fn cancel_all(&self, parent_id: &str) -> usize {
        let ids: Vec<String> = self
            .0
            .children
            .read()
            .await
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut count = 0;
        for id in ids {
            if self.cancel(&id, Some("cancelAll".to_string())).await {
                count += 1;
            }
        }
        count
    }

    /// Resolves immediately for a terminal handle; otherwise blocks until a
    /// transition lands or `timeout_ms` elapses, returning the current
    /// snapshot regardless.
    ///
    /// # Errors
    /// [`SubagentError::NotFound`] if `task_id` is unknown.
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        timeout_ms: u64,
    ) -> SubagentResult<SubagentHandle> {
        let mut receiver = self.0.transitions.subscribe();

        let Some(current) = self.get(task_id).await else {
            return Err(SubagentError::NotFound {
                task_id: task_id.to_string(),
            });
        };
        if current.status.is_terminal() {
            return Ok(current);
        }

        let deadline = time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(time::Instant::now());
            if remaining.is_zero() {
                return Ok(self.get(task_id).await.unwrap_or(current));
            }
            match time::timeout(remaining, receiver.recv()).await {
                Ok(Ok(handle)) if handle.task_id == task_id => {
                    if handle.status.is_terminal() {
                        return Ok(handle);
                    }
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                    if let Some(handle) = self.get(task_id).await {
                        if handle.status.is_terminal() {
                            return Ok(handle);
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return Ok(self.get(task_id).await.unwrap_or(current));
                }
            }
        }
    }

    /// Looks up a handle by id.
    pub async fn get(&self, task_id: &str) -> Option<SubagentHandle> {
        self.0.handles.read().await.get(task_id).cloned()
    }

    /// All handles whose `parentId` matches.
    pub async fn get_by_parent(&self, parent_id: &str) -> Vec<SubagentHandle> {
        self.0
            .handles
            .read()
            .await
            .values()
            .filter(|h| h.parent_id == parent_id)
            .cloned()
            .collect()
    }

    /// Count of non-terminal handles across the whole registry.
    pub async fn active_count(&self) -> usize {
        self.0
            .handles
            .read()
            .await
            .values()
            .filter(|h| h.status.is_active())
            .count()
    }

    /// Count of handles currently sitting in the queue.
    pub async fn queued_count(&self) -> usize {
        self.0.queue.read().await.len()
    }

    /// Count of all tracked handles, terminal or not.
    pub async fn total_count(&self) -> usize {
        self.0.handles.read().await.len()
    }

    /// Removes terminal handles whose `statusChangedAt + gcTtlMs <= now`.
    /// Returns the number of handles removed.
    #[instrument(skip(self))]
    pub async fn gc(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::milliseconds(self.0.limits.gc_ttl_ms as i64);
        let mut handles = self.0.handles.write().await;
        let expired: Vec<String> = handles
            .values()
            .filter(|h| h.status.is_terminal() && h.status_changed_at + ttl <= now)
            .map(|h| h.task_id.clone())
            .collect();

        for task_id in &expired {
            handles.remove(task_id);
        }
        drop(handles);

        if !expired.is_empty() {
            let mut children = self.0.children.write().await;
            for set in children.values_mut() {
                for task_id in &expired {
                    set.remove(task_id);
                }
            }
            debug!(removed = expired.len(), "gc swept terminal handles");
        }

        expired.len()
    }

    /// Spawns a background task that calls [`Self::gc`] on `gcIntervalMs`,
    /// stopping when the registry shuts down.
    pub fn spawn_gc_loop(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let interval_ms = self.0.limits.gc_interval_ms;
        let shutdown = self.0.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.gc().await;
                    }
                }
            }
        })
    }

    /// Cancels every non-terminal handle and signals the scheduler to stop
    /// pulling new work.
    pub async fn shutdown(&self) {
        self.0.shutdown.cancel();
        let ids: Vec<String> = self
            .0
            .handles
            .read()
            .await
            .values()
            .filter(|h| h.status.is_active())
            .map(|h| h.task_id.clone())
            .collect();
        for id in ids {
            self.cancel(&id, Some("shutdown".to_string())).await;
        }
        self.0.work_available.notify_waiters();
    }
}
