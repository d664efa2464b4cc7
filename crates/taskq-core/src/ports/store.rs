//! KeyValueStore port - 共有状態を置く唯一の場所
//!
//! Redis 互換の最小インターフェース。文字列値とソート済み集合が同じ
//! キー空間に同居し、キーごとに TTL を持てる。
//!
//! # 設計原則
//! - 各メソッドは 1 回の往復で完結するアトミック操作
//! - `set_if_absent` は check-then-set ではなく単一操作（lease の正しさはここに依存）
//! - `zadd` は既存メンバーのスコアを上書きする（重複させない）
//! - バックエンド障害は `StoreError::Unavailable` としてそのまま返す

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("wrong type for key {key}")]
    WrongType { key: String },
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key` only when it does not exist. Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Set (overwrite) `key` with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Add `member` to the sorted set, or move it to `score` if already present.
    async fn zadd(&self, set_key: &str, member: &str, score: i64) -> Result<(), StoreError>;

    /// Lowest-scored member and its score.
    async fn zrange_first(&self, set_key: &str) -> Result<Option<(String, i64)>, StoreError>;

    /// Remove `member`. Returns whether it was present.
    async fn zrem(&self, set_key: &str, member: &str) -> Result<bool, StoreError>;

    async fn zcard(&self, set_key: &str) -> Result<u64, StoreError>;

    /// Keys matching a glob pattern (`*`, `?`). Approximate; for stats and scans only.
    async fn keys_matching(&self, pattern: &str) -> Result<BTreeSet<String>, StoreError>;
}
