//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境で衝突しない task id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の producer タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;
}

/// UlidGenerator は Clock の時刻 + ランダム 80bit で ULID を作る
///
/// FixedClock/ManualClock を渡すと timestamp 部分が決定的になる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        TaskId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.task_id();
        let id2 = id_gen.task_id();

        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("task-"));
    }

    #[test]
    fn timestamp_part_follows_the_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(ManualClock::new(fixed_time));

        let id1 = id_gen.task_id();
        let id2 = id_gen.task_id();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
