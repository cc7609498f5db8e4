//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存依赖的集群协作方接口。
//!
//! 消息编解码、连接管理和成员发现由外部实现，这里只约定请求/响应的语义。

use crate::error::{NearCacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// 集群成员地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 集群成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub address: Address,
    pub uuid: Uuid,
    /// 轻量成员不拥有分区
    pub lite_member: bool,
}

impl Member {
    pub fn new(address: Address, lite_member: bool) -> Self {
        Self {
            address,
            uuid: Uuid::new_v4(),
            lite_member,
        }
    }
}

/// 集群成员视图
pub trait ClusterView: Send + Sync {
    /// 当前成员列表
    fn members(&self) -> Vec<Member>;

    /// 客户端是否仍可连接集群
    fn is_alive(&self) -> bool;
}

/// 发往集群的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRequest {
    /// 获取分区表
    GetPartitions,
    /// 批量获取指定映射的失效元数据
    FetchInvalidationMetadata { names: Vec<String> },
}

/// 分区表响应：每个成员地址及其拥有的分区
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTableResponse {
    pub owners: Vec<(Address, Vec<i32>)>,
    pub version: i32,
}

/// 失效元数据响应
///
/// `name_partition_sequences` 为每个映射名称给出 `(分区, 序列号)`，
/// `partition_uuids` 给出分区当前的所有者标识。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationMetadata {
    pub name_partition_sequences: HashMap<String, Vec<(i32, i64)>>,
    pub partition_uuids: HashMap<i32, Uuid>,
}

impl InvalidationMetadata {
    /// 合并另一个成员的响应，同一分区取较大的序列号
    pub fn merge(&mut self, other: InvalidationMetadata) {
        for (name, sequences) in other.name_partition_sequences {
            let entry = self.name_partition_sequences.entry(name).or_default();
            for (partition_id, sequence) in sequences {
                match entry.iter_mut().find(|(p, _)| *p == partition_id) {
                    Some((_, existing)) => *existing = (*existing).max(sequence),
                    None => entry.push((partition_id, sequence)),
                }
            }
        }
        self.partition_uuids.extend(other.partition_uuids);
    }

    pub fn sequences_for(&self, name: &str) -> &[(i32, i64)] {
        self.name_partition_sequences
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.name_partition_sequences.is_empty() && self.partition_uuids.is_empty()
    }
}

/// 集群响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterResponse {
    Partitions(PartitionTableResponse),
    InvalidationMetadata(InvalidationMetadata),
}

/// 调用服务
///
/// `target` 为 `None` 时由实现选择连接（通常是所有者连接）。
/// 失败以错误返回，不代表集群状态。
#[async_trait]
pub trait InvocationService: Send + Sync {
    async fn invoke(
        &self,
        request: ClusterRequest,
        target: Option<Address>,
    ) -> Result<ClusterResponse>;
}

/// 带超时的调用
///
/// # 参数
///
/// * `service` - 调用服务
/// * `request` - 请求
/// * `target` - 目标成员地址
/// * `timeout` - 超时时间
///
/// # 返回值
///
/// 超时返回 `NearCacheError::Timeout`
pub async fn invoke_with_timeout(
    service: &dyn InvocationService,
    request: ClusterRequest,
    target: Option<Address>,
    timeout: Duration,
) -> Result<ClusterResponse> {
    let description = format!("{:?} -> {:?}", request, target);
    match tokio::time::timeout(timeout, service.invoke(request, target)).await {
        Ok(result) => result,
        Err(_) => {
            debug!("调用超时 ({:?}): {}", timeout, description);
            Err(NearCacheError::Timeout(format!(
                "{} did not complete within {:?}",
                description, timeout
            )))
        }
    }
}
