//! Demo CLI for the subagent execution core.
//!
//! Dispatches a handful of subagents against an in-process scheduler whose
//! task body echoes its prompt back (optionally streaming it chunk by
//! chunk), then polls and awaits them to completion. This exercises
//! dispatch → schedule → poll → await end to end without any external
//! dependency.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use subagent_core::domain::models::limits::SubagentLimits;
use subagent_core::infrastructure::config::ConfigLoader;
use subagent_core::infrastructure::logging::{LogConfig, LoggerImpl};
use subagent_core::services::tools::{
    await_subagent, default_oracle, dispatch_subagent, poll_subagent, AwaitInput, DispatchInput,
    PollInput,
};
use subagent_core::{FnTaskBody, HierarchicalEventBus, SubagentRegistry, SubagentScheduler, TaskContext};

/// Run a small end-to-end demo of the subagent core.
#[derive(Debug, Parser)]
#[command(name = "subagent-core-demo", about = "Demo for the subagent execution core")]
struct Cli {
    /// How many subagents to dispatch.
    #[arg(long, default_value_t = 3)]
    count: usize,

    /// Overall await timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Log output format.
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_format = if cli.log_format == "json" {
        subagent_core::infrastructure::logging::LogFormat::Json
    } else {
        subagent_core::infrastructure::logging::LogFormat::Pretty
    };
    let _logger = LoggerImpl::init(&LogConfig {
        format: log_format,
        ..Default::default()
    })?;

    let limits = ConfigLoader::load().unwrap_or_else(|err| {
        tracing::warn!(%err, "falling back to default SubagentLimits");
        SubagentLimits::default()
    });

    let bus = HierarchicalEventBus::new("demo-session", limits);
    let registry = SubagentRegistry::new(limits, bus);
    let task_body = Arc::new(FnTaskBody::new(|ctx: TaskContext| {
        Box::pin(async move {
            for word in ctx.handle.prompt.split_whitespace() {
                ctx.emit_stream.emit(format!("{word} ")).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Ok(format!("echo: {}", ctx.handle.prompt))
        })
    }));
    let scheduler = SubagentScheduler::new(registry.clone(), task_body);
    let workers = scheduler.spawn_workers();
    let gc = registry.spawn_gc_loop();

    let mut task_ids = Vec::with_capacity(cli.count);
    for i in 0..cli.count {
        let result = dispatch_subagent(
            &registry,
            "demo-root",
            0,
            DispatchInput {
                prompt: format!("task number {i}"),
                instructions: None,
                priority: Some(5),
                timeout_ms: None,
                metadata: Default::default(),
            },
        )
        .await;
        println!("dispatch[{i}]: {result:?}");
        if let subagent_core::services::DispatchOutput::Queued { task_id, .. } = result {
            task_ids.push(task_id);
        }
    }

    let poll = poll_subagent(
        &registry,
        PollInput {
            task_ids: task_ids.clone(),
            include_partial_output: false,
            max_partial_output_length: None,
        },
    )
    .await;
    println!("poll summary: {:?}", poll.summary);

    let results = await_subagent(
        &registry,
        default_oracle(),
        AwaitInput {
            task_ids,
            timeout_ms: cli.timeout_ms,
            poll_interval_ms: Some(100),
        },
    )
    .await;
    for result in results {
        println!("await: {result:?}");
    }

    registry.shutdown().await;
    gc.abort();
    for worker in workers {
        worker.abort();
    }

    Ok(())
}
