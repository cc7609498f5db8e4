//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存：记录状态机、有界存储和按映射名称划分的门面。

pub mod near_cache;
pub mod record;
pub mod store;

pub use near_cache::{NearCache, Reservation};
pub use record::{CachedValue, NearCacheRecord, RecordState, ReservationId};
pub use store::{NearCacheStatsSnapshot, NearCacheStore, StaleReadDetector};
