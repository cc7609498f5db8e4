//! oxnear - 分区数据网格客户端的近端缓存
//!
//! 提供本地有界缓存、记录预留协议、容量淘汰与过期、
//! 失效序列记账和周期性反熵修复。

#![doc(html_root_url = "https://docs.rs/oxnear/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod cluster;
pub mod config;
pub mod error;
pub mod eviction;
pub mod invalidation;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod nearcache;
pub mod partition;
pub mod serialization;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use config::Config;
pub use error::{NearCacheError, Result};
pub use eviction::EvictionPolicy;
pub use invalidation::{InvalidationTarget, RepairingHandler, RepairingTask};
pub use manager::NearCacheManager;
pub use nearcache::{NearCache, NearCacheStore};
pub use partition::PartitionRouter;

/// oxnear 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
