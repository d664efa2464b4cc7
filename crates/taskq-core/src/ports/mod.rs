//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! キューエンジンはここにある trait だけに依存し、バックエンドは差し替え可能です。
//!
//! # 設計原則
//! - 共有状態は KeyValueStore にしか置かない（ワーカー同士はプロセス内状態を共有しない）
//! - Schedule と LeaseManager は調整用のインデックス。正本は task record
//! - 時刻と ID はテストで差し替えられるように trait 化する

pub mod clock;
pub mod id_generator;
pub mod lease;
pub mod schedule;
pub mod store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lease::LeaseManager;
pub use self::schedule::{Schedule, ScheduledEntry};
pub use self::store::{KeyValueStore, StoreError};
