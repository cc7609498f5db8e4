//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的错误类型。
//!
//! 网络抖动、序列号缺口、预留竞争等情况不属于错误，
//! 它们通过日志或返回值（`Option`、`bool`、结果枚举）表达。

use thiserror::Error;

/// 近端缓存错误类型枚举
#[derive(Error, Debug)]
pub enum NearCacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 远程调用超时
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 远程调用失败
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// 分区路由不可用（尚未获取分区表，或集群中没有可拥有分区的成员）
    #[error("Partition routing unavailable: {0}")]
    RoutingUnavailable(String),

    /// 未找到指定的近端缓存
    #[error("Near cache not found: {0}")]
    NotFound(String),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML解析错误
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// 近端缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, NearCacheError>;
