//! taskq-core
//!
//! Distributed at-least-once task queue over a shared key/value store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, WorkerId, TaskStatus, Task）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Schedule, LeaseManager, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryStore, ストア上の Schedule / Lease）
//! - **engine**: キューエンジン（enqueue / claim / complete / fail / reap）
//! - **app**: ワーカー側（TaskHandler, HandlerRegistry, WorkerLoop, ReaperLoop, TaskClient）
//! - **keys / codec / config / error**: キー体系、シリアライズ、設定、エラー型

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod impls;
pub mod keys;
pub mod ports;

pub use config::{EngineConfig, ReaperConfig, WorkerConfig};
pub use domain::{Payload, Task, TaskId, TaskStatus, WorkerId};
pub use engine::{QueueEngine, QueueStats, RetryPolicy};
pub use error::{ConfigError, ExecutionError, QueueError};
