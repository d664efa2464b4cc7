//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発・テスト用の KeyValueStore（TTL・ソート済み集合つき）
//! - **StoreSchedule**: KeyValueStore のソート済み集合による Schedule
//! - **StoreLeases**: KeyValueStore の set_if_absent による LeaseManager
//!
//! Redis などの本番バックエンドは KeyValueStore を実装すれば
//! StoreSchedule / StoreLeases をそのまま使える。

pub mod memory_store;
pub mod store_lease;
pub mod store_schedule;

pub use self::memory_store::InMemoryStore;
pub use self::store_lease::StoreLeases;
pub use self::store_schedule::StoreSchedule;
