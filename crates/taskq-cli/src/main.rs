//! taskq - run a local queue with simulated workers.
//!
//! ```bash
//! # 12 tasks, 3 workers, 20% of attempts fail, handlers 10x faster than real time
//! taskq run --tasks 12 --workers 3 --fail-rate 0.2 --time-scale 0.1
//! ```
//!
//! Engine / worker settings come from `TASKQ_*` environment variables
//! (a `.env` file is loaded if present); the flags below override them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskq_core::app::{HandlerRegistry, ReaperLoop, Runtime, TaskClient, TaskHandler, WorkerGroup};
use taskq_core::impls::InMemoryStore;
use taskq_core::{
    EngineConfig, ExecutionError, Payload, QueueEngine, ReaperConfig, Task, TaskId, TaskStatus,
    WorkerConfig,
};

#[derive(Parser)]
#[command(name = "taskq", version, about = "Distributed task queue demo runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit sample tasks and process them with in-process workers
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Number of worker loops
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Number of tasks to submit
    #[arg(long, default_value_t = 9)]
    tasks: usize,

    /// Probability (0..=1) that a handler attempt fails
    #[arg(long, default_value_t = 0.2)]
    fail_rate: f64,

    /// Max concurrent handlers per worker (overrides TASKQ_MAX_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Multiplier applied to simulated handler durations
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

/// Sleeps for a fixed duration, then fails with probability `fail_rate`.
struct SimulatedHandler {
    work: Duration,
    fail_rate: f64,
}

#[async_trait]
impl TaskHandler for SimulatedHandler {
    async fn handle(&self, task: &Task) -> Result<(), ExecutionError> {
        tokio::time::sleep(self.work).await;
        if rand::random::<f64>() < self.fail_rate {
            return Err(ExecutionError::failed(format!(
                "simulated {} failure",
                task.task_type
            )));
        }
        Ok(())
    }
}

fn registry(fail_rate: f64, time_scale: f64) -> Result<HandlerRegistry> {
    let scaled = |ms: u64| Duration::from_secs_f64(ms as f64 / 1000.0 * time_scale);
    let handler = |ms: u64| -> Arc<dyn TaskHandler> {
        Arc::new(SimulatedHandler {
            work: scaled(ms),
            fail_rate,
        })
    };

    let mut registry = HandlerRegistry::new();
    registry.register("email", handler(500))?;
    registry.register("data-processing", handler(2_000))?;
    registry.register("report-generation", handler(3_000))?;
    registry.set_fallback(handler(1_000));
    Ok(registry)
}

fn sample_payload(task_type: &str, n: usize) -> Payload {
    let value = match task_type {
        "email" => json!({ "to": format!("user{n}@example.com"), "subject": "Welcome" }),
        "data-processing" => json!({ "dataset": format!("batch-{n}"), "rows": 1_000 * (n + 1) }),
        _ => json!({ "report": format!("monthly-{n}"), "format": "pdf" }),
    };
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalRow {
    task_id: TaskId,
    #[serde(rename = "type")]
    task_type: String,
    status: TaskStatus,
    retry_count: u32,
    error_message: Option<String>,
}

async fn run(args: RunArgs) -> Result<()> {
    anyhow::ensure!(args.workers > 0, "--workers must be at least 1");
    if !(0.0..=1.0).contains(&args.fail_rate) {
        anyhow::bail!("--fail-rate must be within 0..=1, got {}", args.fail_rate);
    }
    if args.time_scale < 0.0 || !args.time_scale.is_finite() {
        anyhow::bail!("--time-scale must be a non-negative number");
    }

    let engine_config = EngineConfig::from_env().context("engine config")?;
    let mut worker_config = WorkerConfig::from_env().context("worker config")?;
    if let Some(n) = args.concurrency {
        anyhow::ensure!(n > 0, "--concurrency must be at least 1");
        worker_config.max_concurrency = n;
    }
    let reaper_config = ReaperConfig::from_env().context("reaper config")?;

    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(QueueEngine::new(store, engine_config));
    let client = TaskClient::new(Arc::clone(&engine));
    let runtime = Arc::new(Runtime::new(Arc::new(registry(args.fail_rate, args.time_scale)?)));

    let types = ["email", "data-processing", "report-generation"];
    let mut ids = Vec::with_capacity(args.tasks);
    for n in 0..args.tasks {
        let task_type = types[n % types.len()];
        let receipt = client.submit(task_type, sample_payload(task_type, n)).await?;
        println!("{}", serde_json::to_string(&receipt)?);
        ids.push(receipt.task_id);
    }

    let mut group = WorkerGroup::spawn(
        args.workers,
        Arc::clone(&engine),
        runtime,
        &worker_config,
    );
    group.spawn_reaper(ReaperLoop::new(Arc::clone(&engine), reaper_config));

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        match client.stats().await {
            Ok(stats) => info!(
                pending = stats.pending_tasks,
                processing = stats.processing_tasks,
                "queue stats"
            ),
            Err(e) => warn!(error = %e, "stats unavailable"),
        }

        if all_settled(&client, &ids).await? {
            break;
        }
    }

    group.shutdown_and_join().await;

    for id in &ids {
        let Some(task) = client.status(*id).await? else {
            println!("{}", json!({ "taskId": id, "status": "MISSING" }));
            continue;
        };
        let row = FinalRow {
            task_id: task.id,
            task_type: task.task_type,
            status: task.status,
            retry_count: task.retry_count,
            error_message: task.error_message,
        };
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

/// Every task is terminal or its record is gone (expired or evicted).
async fn all_settled(client: &TaskClient, ids: &[TaskId]) -> Result<bool> {
    for id in ids {
        match client.status(*id).await? {
            Some(task) if !task.status.is_terminal() => return Ok(false),
            Some(_) => {}
            None => warn!(task_id = %id, "task record missing; treating as settled"),
        }
    }
    Ok(true)
}
