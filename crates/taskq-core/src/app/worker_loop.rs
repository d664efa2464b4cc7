//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. poll_interval ごとに空き枠（Semaphore）を確認
//! 2. QueueEngine::claim() で earliest task を取得
//! 3. Runtime で handler を実行（tokio::spawn、ループはブロックしない）
//! 4. 成功 → complete()、失敗 → fail()（retry / FAILED はエンジンが判断）
//!
//! ストアのエラーはログに出してループを続ける。handler が panic した場合は
//! 報告されないまま lease が切れ、ReaperLoop が回収する。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::reaper_loop::ReaperLoop;
use super::runtime::Runtime;
use crate::config::WorkerConfig;
use crate::domain::{Task, TaskId, WorkerId};
use crate::engine::QueueEngine;
use crate::error::QueueError;

pub struct WorkerLoop {
    engine: Arc<QueueEngine>,
    runtime: Arc<Runtime>,
    config: WorkerConfig,
}

impl WorkerLoop {
    pub fn new(engine: Arc<QueueEngine>, runtime: Arc<Runtime>, config: WorkerConfig) -> Self {
        Self {
            engine,
            runtime,
            config,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.config.worker_id
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped), then
    /// wait for in-flight handlers to finish and report.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let worker_id = self.config.worker_id.clone();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut in_flight = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            %worker_id,
            max_concurrency = self.config.max_concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(&worker_id, joined);
            }

            // 枠が埋まっていたら claim しない
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                continue;
            };

            match self.engine.claim(&worker_id).await {
                Ok(Some(task)) => {
                    let engine = Arc::clone(&self.engine);
                    let runtime = Arc::clone(&self.runtime);
                    in_flight.spawn(execute_claimed(engine, runtime, task, permit));
                }
                Ok(None) => {}
                Err(e) => error!(%worker_id, error = %e, "claim failed"),
            }
        }

        info!(%worker_id, in_flight = in_flight.len(), "worker stopping");
        while let Some(joined) = in_flight.join_next().await {
            log_join_error(&worker_id, joined);
        }
        info!(%worker_id, "worker stopped");
    }

    /// Claim one task and run it to completion on the current task.
    /// Returns the id of the task handled, if any.
    pub async fn run_once(&self) -> Result<Option<TaskId>, QueueError> {
        let Some(task) = self.engine.claim(&self.config.worker_id).await? else {
            return Ok(None);
        };
        let task_id = task.id;
        report(&self.engine, &self.runtime, &task).await?;
        Ok(Some(task_id))
    }
}

async fn execute_claimed(
    engine: Arc<QueueEngine>,
    runtime: Arc<Runtime>,
    task: Task,
    _permit: OwnedSemaphorePermit,
) {
    if let Err(e) = report(&engine, &runtime, &task).await {
        error!(task_id = %task.id, error = %e, "failed to report task outcome");
    }
}

async fn report(engine: &QueueEngine, runtime: &Runtime, task: &Task) -> Result<(), QueueError> {
    match runtime.execute(task).await {
        Ok(()) => engine.complete(task.id).await,
        Err(err) => {
            debug!(task_id = %task.id, task_type = %task.task_type, error = %err, "handler returned error");
            engine.fail(task.id, &err.to_string()).await
        }
    }
}

fn log_join_error(worker_id: &WorkerId, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(%worker_id, error = %e, "handler task aborted; lease will expire");
    }
}

/// Worker group handle.
/// - `request_shutdown()` で全ワーカーが新しい claim をやめる
/// - `shutdown_and_join()` で実行中の handler まで待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    worker_ids: Vec<WorkerId>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers. Each gets `config` with the id suffixed `-1`, `-2`, ...
    pub fn spawn(
        n: usize,
        engine: Arc<QueueEngine>,
        runtime: Arc<Runtime>,
        config: &WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut worker_ids = Vec::with_capacity(n);
        let mut joins = Vec::with_capacity(n);
        for i in 1..=n {
            let mut worker_config = config.clone();
            worker_config.worker_id = WorkerId::new(format!("{}-{i}", config.worker_id));
            worker_ids.push(worker_config.worker_id.clone());

            let worker = WorkerLoop::new(Arc::clone(&engine), Arc::clone(&runtime), worker_config);
            joins.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        Self {
            shutdown_tx,
            worker_ids,
            joins,
        }
    }

    /// Run a reaper alongside the workers, stopped by the same shutdown.
    pub fn spawn_reaper(&mut self, reaper: ReaperLoop) {
        let rx = self.shutdown_tx.subscribe();
        self.joins.push(tokio::spawn(reaper.run(rx)));
    }

    pub fn worker_ids(&self) -> &[WorkerId] {
        &self.worker_ids
    }

    /// Stop taking new tasks. In-flight handlers are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}
