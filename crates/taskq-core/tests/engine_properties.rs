use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use taskq_core::impls::{InMemoryStore, StoreSchedule};
use taskq_core::keys::Keyspace;
use taskq_core::ports::{Clock, KeyValueStore, ManualClock, Schedule, ScheduledEntry, StoreError};
use taskq_core::{EngineConfig, Payload, QueueEngine, QueueStats, TaskId, TaskStatus, WorkerId};

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn setup(config: EngineConfig) -> (Arc<QueueEngine>, Arc<InMemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
    let engine = QueueEngine::builder(store.clone())
        .config(config)
        .clock(clock.clone())
        .build();
    (Arc::new(engine), store, clock)
}

fn email() -> Payload {
    let mut payload = Payload::new();
    payload.insert("to".into(), json!("x@y.com"));
    payload
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_of_many_workers_claims_a_task() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();

    let mut joins = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        joins.push(tokio::spawn(async move {
            engine.claim(&WorkerId::new(format!("w{i}"))).await.unwrap()
        }));
    }

    let mut winners = Vec::new();
    for j in joins {
        if let Some(t) = j.await.unwrap() {
            winners.push(t);
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, task.id);
    assert_eq!(
        engine.lease_holder(task.id).await.unwrap(),
        winners[0].worker_id
    );
}

#[tokio::test]
async fn email_task_runs_to_completion() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    let id = engine.enqueue(&task).await.unwrap();

    let claimed = engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(claimed.payload["to"], "x@y.com");
    engine.complete(id).await.unwrap();

    let done = engine.get_task(id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(done.worker_id, Some(WorkerId::new("w1")));
    assert_eq!(engine.stats().await.unwrap(), QueueStats::default());
}

#[tokio::test]
async fn completing_twice_changes_nothing() {
    let (engine, _store, clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();

    engine.complete(task.id).await.unwrap();
    let first = engine.get_task(task.id).await.unwrap();

    clock.advance(Duration::from_secs(10));
    engine.complete(task.id).await.unwrap();
    let second = engine.get_task(task.id).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn retries_back_off_then_fail_permanently() {
    let (engine, _store, clock) = setup(EngineConfig::default());
    let worker = WorkerId::new("w1");
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();

    // attempt 1
    engine.claim(&worker).await.unwrap().unwrap();
    let t1 = clock.now();
    engine.fail(task.id, "timeout").await.unwrap();
    let after1 = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(after1.retry_count, 1);
    assert_eq!(after1.status, TaskStatus::Retrying);
    assert_eq!(after1.scheduled_at, t1 + chrono::Duration::seconds(2));

    // not due yet
    assert!(engine.claim(&worker).await.unwrap().is_none());

    // attempt 2
    clock.advance(Duration::from_secs(2));
    engine.claim(&worker).await.unwrap().unwrap();
    let t2 = clock.now();
    engine.fail(task.id, "timeout").await.unwrap();
    let after2 = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(after2.retry_count, 2);
    assert_eq!(after2.scheduled_at, t2 + chrono::Duration::seconds(4));

    // attempt 3
    clock.advance(Duration::from_secs(4));
    engine.claim(&worker).await.unwrap().unwrap();
    engine.fail(task.id, "still broken").await.unwrap();
    let after3 = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(after3.retry_count, 3);
    assert_eq!(after3.status, TaskStatus::Failed);
    assert_eq!(after3.error_message.as_deref(), Some("still broken"));
    assert!(after3.completed_at.is_some());

    assert_eq!(engine.stats().await.unwrap(), QueueStats::default());
}

#[tokio::test]
async fn single_retry_budget_fails_on_first_error() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email()).with_max_retries(1);
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();
    let pending_before = engine.stats().await.unwrap().pending_tasks;

    engine.fail(task.id, "boom").await.unwrap();

    let t = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Failed);
    assert_eq!(t.retry_count, 1);
    assert_eq!(t.error_message.as_deref(), Some("boom"));
    assert_eq!(engine.stats().await.unwrap().pending_tasks, pending_before);
}

#[tokio::test]
async fn zero_retry_budget_fails_without_incrementing_past_max() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email()).with_max_retries(0);
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();

    engine.fail(task.id, "boom").await.unwrap();

    let t = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Failed);
    assert_eq!(t.retry_count, 0);
}

#[tokio::test]
async fn lookup_during_processing_returns_the_enqueued_record() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();

    // 永続レコードが優先されるので、処理中でも PENDING が見える
    let seen = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(seen.status, TaskStatus::Pending);
}

#[tokio::test]
async fn lookup_falls_back_to_processing_record() {
    let (engine, store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();
    store.delete(&Keyspace::default().data(task.id)).await.unwrap();

    let seen = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(seen.status, TaskStatus::Processing);
}

#[tokio::test]
async fn expired_lease_after_crash_before_schedule_removal_is_claimable() {
    let (engine, store, clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();

    // 別ワーカーが lease を取った直後に落ちた（schedule にはまだ残っている）
    store
        .set_if_absent(
            &Keyspace::default().lock(task.id),
            "worker-dead",
            Duration::from_secs(30),
        )
        .await
        .unwrap();
    assert!(engine.claim(&WorkerId::new("w1")).await.unwrap().is_none());

    clock.advance(Duration::from_secs(30));

    let claimed = engine.claim(&WorkerId::new("w1")).await.unwrap();
    assert_eq!(claimed.map(|t| t.id), Some(task.id));
}

#[tokio::test]
async fn crashed_worker_task_is_reclaimed_and_rerun() {
    let (engine, _store, clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("worker-dead")).await.unwrap();

    assert!(engine.reap_expired_leases().await.unwrap().is_empty());

    clock.advance(Duration::from_secs(31));
    assert_eq!(engine.reap_expired_leases().await.unwrap(), vec![task.id]);

    let rerun = engine.claim(&WorkerId::new("w2")).await.unwrap().unwrap();
    assert_eq!(rerun.id, task.id);
    assert_eq!(rerun.retry_count, 0);
    engine.complete(task.id).await.unwrap();

    let done = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.worker_id, Some(WorkerId::new("w2")));
}

#[tokio::test]
async fn due_time_filter_can_be_disabled() {
    let later = start() + chrono::Duration::hours(1);

    let (strict, _, _) = setup(EngineConfig::default());
    let task = strict.new_task("email", email()).with_scheduled_at(later);
    strict.enqueue(&task).await.unwrap();
    assert!(strict.claim(&WorkerId::new("w1")).await.unwrap().is_none());

    let (eager, _, _) = setup(EngineConfig::default().with_respect_due_time(false));
    let task = eager.new_task("email", email()).with_scheduled_at(later);
    eager.enqueue(&task).await.unwrap();
    assert!(eager.claim(&WorkerId::new("w1")).await.unwrap().is_some());
}

#[tokio::test]
async fn earliest_due_task_is_claimed_first() {
    let (engine, _store, clock) = setup(EngineConfig::default());
    let late = engine
        .new_task("report-generation", Payload::new())
        .with_scheduled_at(start() + chrono::Duration::seconds(5));
    let early = engine.new_task("email", email());
    engine.enqueue(&late).await.unwrap();
    engine.enqueue(&early).await.unwrap();
    clock.advance(Duration::from_secs(5));

    let first = engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    let second = engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();

    assert_eq!(first.id, early.id);
    assert_eq!(second.id, late.id);
}

#[tokio::test]
async fn store_outage_surfaces_as_unavailable() {
    let (engine, store, _clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    engine.claim(&WorkerId::new("w1")).await.unwrap();

    store.set_available(false);

    assert!(engine.complete(task.id).await.unwrap_err().is_store_unavailable());
    assert!(engine.fail(task.id, "x").await.unwrap_err().is_store_unavailable());
    assert!(engine.get_task(task.id).await.unwrap_err().is_store_unavailable());

    store.set_available(true);
    engine.complete(task.id).await.unwrap();
    assert_eq!(
        engine.get_task(task.id).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
}

/// Schedule whose peek keeps returning what it saw first, like a worker
/// that read the head just before another worker claimed it.
struct FrozenPeek {
    inner: StoreSchedule,
    head: ScheduledEntry,
}

#[async_trait]
impl Schedule for FrozenPeek {
    async fn insert(&self, task_id: TaskId, due_millis: i64) -> Result<(), StoreError> {
        self.inner.insert(task_id, due_millis).await
    }

    async fn peek_earliest(&self) -> Result<Option<ScheduledEntry>, StoreError> {
        Ok(Some(self.head))
    }

    async fn remove(&self, task_id: TaskId) -> Result<bool, StoreError> {
        self.inner.remove(task_id).await
    }

    async fn size(&self) -> Result<u64, StoreError> {
        self.inner.size().await
    }
}

/// Second engine on the same store whose schedule peek is stuck on `task_id`.
fn lagging_engine(
    store: &Arc<InMemoryStore>,
    clock: &Arc<ManualClock>,
    task_id: TaskId,
    due_millis: i64,
) -> QueueEngine {
    let schedule = FrozenPeek {
        inner: StoreSchedule::new(store.clone(), &Keyspace::default()),
        head: ScheduledEntry {
            task_id,
            due_millis,
        },
    };
    QueueEngine::builder(store.clone())
        .clock(clock.clone())
        .schedule(Arc::new(schedule))
        .build()
}

#[tokio::test]
async fn late_claim_does_not_revive_a_completed_task() {
    let (engine, store, clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    let lagging = lagging_engine(&store, &clock, task.id, task.due_millis());

    engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    engine.complete(task.id).await.unwrap();

    assert!(lagging.claim(&WorkerId::new("w2")).await.unwrap().is_none());
    assert_eq!(lagging.lease_holder(task.id).await.unwrap(), None);

    lagging.fail(task.id, "dup run").await.unwrap();
    let t = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.retry_count, 0);
    assert_eq!(engine.stats().await.unwrap(), QueueStats::default());
}

#[tokio::test]
async fn terminal_record_left_in_schedule_is_dropped() {
    let (engine, _store, _clock) = setup(EngineConfig::default());
    let mut task = engine.new_task("email", email());
    task.mark_completed(start());
    engine.enqueue(&task).await.unwrap();

    assert!(engine.claim(&WorkerId::new("w1")).await.unwrap().is_none());
    assert_eq!(engine.stats().await.unwrap().pending_tasks, 0);
    assert_eq!(engine.lease_holder(task.id).await.unwrap(), None);
    assert_eq!(
        engine.get_task(task.id).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn late_claim_does_not_skip_retry_backoff() {
    let (engine, store, clock) = setup(EngineConfig::default());
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();
    let lagging = lagging_engine(&store, &clock, task.id, task.due_millis());

    engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    engine.fail(task.id, "timeout").await.unwrap();
    let retry_at = engine.get_task(task.id).await.unwrap().unwrap().scheduled_at;

    assert!(lagging.claim(&WorkerId::new("w2")).await.unwrap().is_none());

    let t = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Retrying);
    assert_eq!(t.scheduled_at, retry_at);
    assert_eq!(
        engine.stats().await.unwrap(),
        QueueStats {
            pending_tasks: 1,
            processing_tasks: 0
        }
    );
    assert_eq!(engine.lease_holder(task.id).await.unwrap(), None);

    clock.advance(Duration::from_secs(2));
    let rerun = engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(rerun.retry_count, 1);
}

#[tokio::test]
async fn out_of_range_ttls_from_env_do_not_panic() {
    let max = u64::MAX.to_string();
    let config = EngineConfig::from_lookup(|name| match name {
        "TASKQ_LEASE_TTL_SECS" | "TASKQ_PROCESSING_TTL_SECS" | "TASKQ_RECORD_TTL_SECS" => {
            Some(max.clone())
        }
        _ => None,
    })
    .unwrap();
    let (engine, _store, clock) = setup(config);
    let task = engine.new_task("email", email());
    engine.enqueue(&task).await.unwrap();

    engine.claim(&WorkerId::new("w1")).await.unwrap().unwrap();
    clock.advance(Duration::from_secs(10 * 365 * 24 * 60 * 60));

    assert_eq!(
        engine.lease_holder(task.id).await.unwrap(),
        Some(WorkerId::new("w1"))
    );
    engine.complete(task.id).await.unwrap();
}
