//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供测试和示例共用的工具函数，包括：
//! - 日志设置工具
//! - 名称生成工具
//! - 近端缓存配置创建工具

use crate::config::{Config, NearCacheConfig};
use crate::eviction::EvictionPolicy;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的近端缓存名称
pub fn generate_unique_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

/// 创建只包含一个近端缓存的客户端配置
pub fn create_single_cache_config(
    name: &str,
    eviction_policy: EvictionPolicy,
    max_entry_count: i32,
) -> Config {
    let mut config = Config::default();
    config.near_caches.insert(
        name.to_string(),
        NearCacheConfig {
            eviction_policy,
            max_entry_count,
            ..Default::default()
        },
    );
    config
}
