//! Schedule port - 実行可能な task id の時刻順インデックス
//!
//! 同じ due time 同士の順序は保証しない（ストア依存）。
//! ワーカー間の取り合いは lease で直列化されるので問題にならない。

use async_trait::async_trait;

use crate::domain::TaskId;
use crate::ports::StoreError;

/// Earliest schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEntry {
    pub task_id: TaskId,
    /// Due time, epoch millis.
    pub due_millis: i64,
}

#[async_trait]
pub trait Schedule: Send + Sync {
    /// Insert or move `task_id` to `due_millis`.
    async fn insert(&self, task_id: TaskId, due_millis: i64) -> Result<(), StoreError>;

    async fn peek_earliest(&self) -> Result<Option<ScheduledEntry>, StoreError>;

    /// Returns whether the id was present.
    async fn remove(&self, task_id: TaskId) -> Result<bool, StoreError>;

    async fn size(&self) -> Result<u64, StoreError>;
}
