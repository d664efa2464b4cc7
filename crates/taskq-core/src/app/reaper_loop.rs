//! ReaperLoop - Lease 期限切れの回収
//!
//! claim したワーカーが complete / fail を報告せずに落ちると、タスクは
//! processing レコードだけ残して schedule から消えたままになる。
//! ReaperLoop は一定間隔で QueueEngine::reap_expired_leases() を呼び、
//! そういうタスクを PENDING に戻して再配送する。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::ReaperConfig;
use crate::engine::QueueEngine;

pub struct ReaperLoop {
    engine: Arc<QueueEngine>,
    config: ReaperConfig,
}

impl ReaperLoop {
    pub fn new(engine: Arc<QueueEngine>, config: ReaperConfig) -> Self {
        Self { engine, config }
    }

    /// Sweep once per interval until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

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

            match self.engine.reap_expired_leases().await {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    info!(count = reclaimed.len(), "reaper re-enqueued tasks");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reaper sweep failed"),
            }
        }
    }
}
