//! Bounded worker pool that drains the registry's priority queue and
//! executes task bodies.
//!
//! A worker's loop is: pull the highest-priority ready handle; if none,
//! wait for the registry to signal new work or shutdown; on a pull,
//! transition to `running`, invoke the task body with `(handle, cancelToken,
//! emitStream)`, then transition to a terminal status based on the body's
//! outcome. A per-task watchdog (`tokio::time::timeout`) races the body
//! future and reports `timeout` if it fires first.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::subagent::{SubagentHandle, SubagentStatus};
use crate::services::subagent_registry::{SubagentRegistry, TransitionPatch};

/// Everything a task body needs: its handle snapshot at start, its
/// cancellation signal, and a way to publish streaming partials.
pub struct TaskContext {
    /// The handle as of the `running` transition.
    pub handle: SubagentHandle,
    /// Observe this for cooperative cancellation at `.await` points.
    pub cancel_token: CancellationToken,
    /// Call to append a partial chunk and move to `streaming`.
    pub emit_stream: EmitStream,
}

/// Lets a task body append partial output without touching the registry
/// directly.
#[derive(Clone)]
pub struct EmitStream {
    registry: SubagentRegistry,
    task_id: String,
}

impl EmitStream {
    /// Appends `chunk` to `partialOutput`, transitioning to `streaming`
    /// (idempotently, if already streaming).
    pub async fn emit(&self, chunk: impl Into<String>) {
        self.registry
            .transition(
                &self.task_id,
                SubagentStatus::Streaming,
                TransitionPatch {
                    partial_chunk: Some(chunk.into()),
                    ..Default::default()
                },
            )
            .await;
    }
}

/// A user-supplied unit of work. The core treats this as opaque: it only
/// cares whether it finished with output, failed with an error, or timed
/// out.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Executes one dispatched subagent. Returning `Err` transitions the
    /// handle to `failed` with the stringified error as `error`.
    async fn run(&self, ctx: TaskContext) -> Result<String, String>;
}

/// Adapts a plain async closure into a [`TaskBody`].
pub struct FnTaskBody<F>(F)
where
    F: Fn(TaskContext) -> BoxFuture<'static, Result<String, String>> + Send + Sync;

impl<F> FnTaskBody<F>
where
    F: Fn(TaskContext) -> BoxFuture<'static, Result<String, String>> + Send + Sync,
{
    /// Wraps `f` as a [`TaskBody`].
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> TaskBody for FnTaskBody<F>
where
    F: Fn(TaskContext) -> BoxFuture<'static, Result<String, String>> + Send + Sync,
{
    async fn run(&self, ctx: TaskContext) -> Result<String, String> {
        (self.0)(ctx).await
    }
}

/// Owns a bounded pool of worker loops draining a [`SubagentRegistry`].
pub struct SubagentScheduler {
    registry: SubagentRegistry,
    task_body: Arc<dyn TaskBody>,
}

impl SubagentScheduler {
    /// Builds a scheduler over `registry`, running every dispatched task
    /// through `task_body`.
    pub fn new(registry: SubagentRegistry, task_body: Arc<dyn TaskBody>) -> Self {
        Self { registry, task_body }
    }

    /// Spawns `workerPoolSize` worker loops and returns their join handles.
    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        let pool_size = self.registry.limits().worker_pool_size;
        (0..pool_size)
            .map(|worker_index| {
                let registry = self.registry.clone();
                let task_body = self.task_body.clone();
                tokio::spawn(worker_loop(worker_index, registry, task_body))
            })
            .collect()
    }
}

async fn worker_loop(worker_index: usize, registry: SubagentRegistry, task_body: Arc<dyn TaskBody>) {
    let shutdown = registry.shutdown_token();
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let notified = registry.work_available().notified();
        if let Some(task_id) = registry.pull_next().await {
            execute_one(&registry, &task_body, &task_id).await;
            continue;
        }

        tokio::select! {
            () = notified => {}
            () = shutdown.cancelled() => break,
        }
    }
    info!(worker_index, "scheduler worker stopped");
}

async fn execute_one(registry: &SubagentRegistry, task_body: &Arc<dyn TaskBody>, task_id: &str) {
    let Some(handle) = registry
        .transition(task_id, SubagentStatus::Running, TransitionPatch::default())
        .await
    else {
        return;
    };
    if handle.status != SubagentStatus::Running {
        // Already cancelled (or otherwise terminal) between dequeue and
        // pickup; the transition above was a no-op.
        return;
    }

    let ctx = TaskContext {
        handle: handle.clone(),
        cancel_token: handle.cancel_token.clone(),
        emit_stream: EmitStream {
            registry: registry.clone(),
            task_id: task_id.to_string(),
        },
    };

    let outcome = match handle.timeout_ms {
        Some(timeout_ms) => {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), task_body.run(ctx)).await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(task_id, timeout_ms, "subagent watchdog fired");
                    registry
                        .transition(
                            task_id,
                            SubagentStatus::Timeout,
                            TransitionPatch {
                                error: Some(format!("exceeded timeout of {timeout_ms}ms")),
                                ..Default::default()
                            },
                        )
                        .await;
                    return;
                }
            }
        }
        None => task_body.run(ctx).await,
    };

    match outcome {
        Ok(output) => {
            registry
                .transition(
                    task_id,
                    SubagentStatus::Completed,
                    TransitionPatch {
                        final_output: Some(output),
                        ..Default::default()
                    },
                )
                .await;
        }
        Err(error) => {
            registry
                .transition(
                    task_id,
                    SubagentStatus::Failed,
                    TransitionPatch {
                        error: Some(error),
                        ..Default::default()
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::limits::SubagentLimits;
    use crate::services::event_bus::HierarchicalEventBus;
    use crate::services::subagent_registry::DispatchParams;
    use std::time::Duration as StdDuration;

    fn registry(limits: SubagentLimits) -> SubagentRegistry {
        let bus = HierarchicalEventBus::new("sched-test", limits);
        SubagentRegistry::new(limits, bus)
    }

    fn echo_body() -> Arc<dyn TaskBody> {
        Arc::new(FnTaskBody::new(|ctx: TaskContext| {
            Box::pin(async move { Ok(format!("echo:{}", ctx.handle.prompt)) })
        }))
    }

    #[tokio::test]
    async fn happy_path_completes_with_output() {
        let registry = registry(SubagentLimits::default());
        let scheduler = SubagentScheduler::new(registry.clone(), echo_body());
        let workers = scheduler.spawn_workers();

        let handle = registry
            .dispatch(
                "root",
                0,
                DispatchParams {
                    prompt: "a".into(),
                    priority: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = registry.wait_for_completion(&handle.task_id, 1000).await.unwrap();
        assert_eq!(result.status, crate::domain::models::subagent::SubagentStatus::Completed);
        assert_eq!(result.final_output.as_deref(), Some("echo:a"));

        registry.shutdown().await;
        for worker in workers {
            let _ = tokio::time::timeout(StdDuration::from_millis(500), worker).await;
        }
    }

    #[tokio::test]
    async fn priority_order_with_single_worker() {
        let limits = SubagentLimits {
            worker_pool_size: 1,
            ..Default::default()
        };
        let registry = registry(limits);
        let order: Arc<tokio::sync::Mutex<Vec<String>>> = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let recorder = order.clone();
        let body: Arc<dyn TaskBody> = Arc::new(FnTaskBody::new(move |ctx: TaskContext| {
            let recorder = recorder.clone();
            Box::pin(async move {
                recorder.lock().await.push(ctx.handle.prompt.clone());
                Ok("ok".to_string())
            })
        }));
        let scheduler = SubagentScheduler::new(registry.clone(), body);

        // Dispatch all three before any worker is running so the queue
        // ordering, not scheduling luck, decides pickup order.
        for (prompt, priority) in [("ten", 10), ("one", 1), ("five", 5)] {
            registry
                .dispatch(
                    "root",
                    0,
                    DispatchParams {
                        prompt: prompt.into(),
                        priority: Some(priority),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let workers = scheduler.spawn_workers();
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert_eq!(*order.lock().await, vec!["one", "five", "ten"]);

        registry.shutdown().await;
        for worker in workers {
            let _ = tokio::time::timeout(StdDuration::from_millis(500), worker).await;
        }
    }

    #[tokio::test]
    async fn watchdog_times_out_a_body_that_never_yields() {
        let registry = registry(SubagentLimits::default());
        let body: Arc<dyn TaskBody> = Arc::new(FnTaskBody::new(|_ctx: TaskContext| {
            Box::pin(async move {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                Ok("never".to_string())
            })
        }));
        let scheduler = SubagentScheduler::new(registry.clone(), body);
        let workers = scheduler.spawn_workers();

        let handle = registry
            .dispatch(
                "root",
                0,
                DispatchParams {
                    prompt: "a".into(),
                    timeout_ms: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = registry.wait_for_completion(&handle.task_id, 1000).await.unwrap();
        assert_eq!(result.status, crate::domain::models::subagent::SubagentStatus::Timeout);
        assert!(result.error.is_some());

        registry.shutdown().await;
        for worker in workers {
            worker.abort();
        }
    }
}
