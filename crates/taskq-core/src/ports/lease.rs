//! LeaseManager port - task id に対する期限付きの排他的な占有
//!
//! # 設計原則
//! - `try_acquire` は単一のアトミック操作（未期限の lease を上書きしない）
//! - `release` は冪等（解放済み・期限切れでもエラーにしない）
//! - 明示的な release がなくても ttl 経過で自動的に失効する
//!
//! 延長（heartbeat）はしない。ttl は最悪ケースの実行時間を目安に決める。

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{TaskId, WorkerId};
use crate::ports::StoreError;

#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Returns `true` when the lease was granted to `owner`.
    async fn try_acquire(
        &self,
        task_id: TaskId,
        owner: &WorkerId,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn release(&self, task_id: TaskId) -> Result<(), StoreError>;

    /// Current holder, if the lease is live.
    async fn holder(&self, task_id: TaskId) -> Result<Option<WorkerId>, StoreError>;
}
