//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的配置结构和解析逻辑。

use crate::error::Result;
use crate::eviction::EvictionPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 默认最大条目数
pub const DEFAULT_MAX_ENTRY_COUNT: i32 = 10_000;
/// 未发布预留的回收时限（毫秒）
pub const DEFAULT_RESERVATION_TIMEOUT_MS: u64 = 60_000;
/// 分区表刷新间隔（毫秒）
pub const DEFAULT_PARTITION_REFRESH_INTERVAL_MS: u64 = 10_000;
/// 失效元数据对账间隔（毫秒）
pub const DEFAULT_RECONCILIATION_INTERVAL_MS: u64 = 10_000;
/// 单次对账允许的最大陈旧分区数，超过后整体清空
pub const DEFAULT_MAX_TOLERATED_STALE_PARTITIONS: usize = 10;

/// 客户端级配置
///
/// 一个客户端对应一个 `NearCacheManager`，所有近端缓存共享同一个分区路由和修复任务。
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub repairing: RepairingConfig,
    /// 按映射名称配置的近端缓存，名称支持以 `*` 结尾的前缀通配
    #[serde(default)]
    pub near_caches: HashMap<String, NearCacheConfig>,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 过期清理任务周期（毫秒），0表示禁用后台清理
    pub expiration_task_period_ms: u64,
    /// 是否启用指标收集
    pub enable_metrics: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            expiration_task_period_ms: 5_000,
            enable_metrics: true,
        }
    }
}

/// 内存存储格式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InMemoryFormat {
    /// 以序列化后的二进制形式保存
    #[default]
    Binary,
    /// 以反序列化后的对象形式保存
    Object,
}

/// 近端缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct NearCacheConfig {
    /// 内存存储格式
    pub in_memory_format: InMemoryFormat,
    /// 容量淘汰策略
    pub eviction_policy: EvictionPolicy,
    /// 最大条目数，0表示不限制，负数非法
    pub max_entry_count: i32,
    /// 存活时间（毫秒），0表示不按存活时间过期
    pub time_to_live_ms: u64,
    /// 最大空闲时间（毫秒），0表示不按空闲时间过期
    pub max_idle_ms: u64,
    /// 集群数据变更时是否失效本地条目
    pub invalidate_on_change: bool,
    /// 未发布的预留最长保留时间（毫秒），超时后由过期清理回收，0表示只按存活/空闲时间回收
    pub reservation_timeout_ms: u64,
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            in_memory_format: InMemoryFormat::Binary,
            eviction_policy: EvictionPolicy::Lru,
            max_entry_count: DEFAULT_MAX_ENTRY_COUNT,
            time_to_live_ms: 0,
            max_idle_ms: 0,
            invalidate_on_change: true,
            reservation_timeout_ms: DEFAULT_RESERVATION_TIMEOUT_MS,
        }
    }
}

impl NearCacheConfig {
    pub fn time_to_live(&self) -> Duration {
        Duration::from_millis(self.time_to_live_ms)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    pub fn reservation_timeout(&self) -> Duration {
        Duration::from_millis(self.reservation_timeout_ms)
    }

    /// 容量上限，`None` 表示不限制
    pub fn capacity(&self) -> Option<usize> {
        if self.max_entry_count > 0 {
            Some(self.max_entry_count as usize)
        } else {
            None
        }
    }

    /// 验证单个近端缓存配置
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_entry_count < 0 {
            return Err(format!(
                "max_entry_count cannot be negative (got {})",
                self.max_entry_count
            ));
        }
        Ok(())
    }
}

/// 分区路由配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PartitionConfig {
    /// 分区表定期刷新间隔（毫秒）
    pub refresh_interval_ms: u64,
    /// 获取分区表的调用超时（毫秒）
    pub invocation_timeout_ms: u64,
    /// 首次获取分区表失败后的重试间隔（毫秒）
    pub fetch_retry_delay_ms: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_PARTITION_REFRESH_INTERVAL_MS,
            invocation_timeout_ms: 5_000,
            fetch_retry_delay_ms: 100,
        }
    }
}

/// 失效修复（反熵）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RepairingConfig {
    /// 对账间隔（毫秒）
    pub reconciliation_interval_ms: u64,
    /// 获取失效元数据的调用超时（毫秒）
    pub invocation_timeout_ms: u64,
    /// 单个处理器允许的最大陈旧分区数
    pub max_tolerated_stale_partitions: usize,
}

impl Default for RepairingConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval_ms: DEFAULT_RECONCILIATION_INTERVAL_MS,
            invocation_timeout_ms: 5_000,
            max_tolerated_stale_partitions: DEFAULT_MAX_TOLERATED_STALE_PARTITIONS,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置并验证
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config
            .validate()
            .map_err(crate::error::NearCacheError::ConfigError)?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 查找映射名称对应的近端缓存配置
    ///
    /// 精确匹配优先，其次是最长的前缀通配（`orders-*`）
    pub fn near_cache_config(&self, map_name: &str) -> Option<&NearCacheConfig> {
        if let Some(config) = self.near_caches.get(map_name) {
            return Some(config);
        }
        self.near_caches
            .iter()
            .filter_map(|(pattern, config)| {
                pattern
                    .strip_suffix('*')
                    .filter(|prefix| map_name.starts_with(prefix))
                    .map(|prefix| (prefix.len(), config))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, config)| config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，所有违规在配置阶段拒绝，而不是在运行时
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.partition.refresh_interval_ms == 0 {
            return Err("partition refresh_interval_ms cannot be zero".to_string());
        }
        if self.partition.invocation_timeout_ms == 0 {
            return Err("partition invocation_timeout_ms cannot be zero".to_string());
        }
        if self.repairing.reconciliation_interval_ms == 0 {
            return Err("repairing reconciliation_interval_ms cannot be zero".to_string());
        }
        if self.repairing.invocation_timeout_ms == 0 {
            return Err("repairing invocation_timeout_ms cannot be zero".to_string());
        }

        for (name, near_cache) in &self.near_caches {
            if name.is_empty() || name == "*" {
                return Err("Near cache name cannot be empty".to_string());
            }
            near_cache
                .validate()
                .map_err(|e| format!("Near cache '{}': {}", name, e))?;
        }

        Ok(())
    }
}
