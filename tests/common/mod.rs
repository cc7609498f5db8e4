//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和进程内的模拟集群。

#![allow(dead_code)]

use async_trait::async_trait;
use oxnear::cluster::{
    Address, ClusterRequest, ClusterResponse, ClusterView, InvalidationMetadata,
    InvocationService, Member, PartitionTableResponse,
};
use oxnear::config::PartitionConfig;
use oxnear::error::{NearCacheError, Result};
use oxnear::serialization::SerializerEnum;
use oxnear::PartitionRouter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

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

pub fn generate_unique_name(base: &str) -> String {
    oxnear::utils::generate_unique_name(base)
}

/// 模拟集群
///
/// 同时实现调用服务和成员视图，响应内容和故障可以在测试中随时调整
pub struct FakeCluster {
    members: Mutex<Vec<Member>>,
    alive: AtomicBool,
    partition_count: Mutex<i32>,
    metadata: Mutex<InvalidationMetadata>,
    failing: AtomicBool,
    fail_next_partition_calls: AtomicUsize,
    metadata_delay: Mutex<Option<Duration>>,
    partition_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl FakeCluster {
    /// 一个拥有全部分区的数据成员
    pub fn new(partition_count: i32) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(vec![Member::new(Address::new("127.0.0.1", 5701), false)]),
            alive: AtomicBool::new(true),
            partition_count: Mutex::new(partition_count),
            metadata: Mutex::new(InvalidationMetadata::default()),
            failing: AtomicBool::new(false),
            fail_next_partition_calls: AtomicUsize::new(0),
            metadata_delay: Mutex::new(None),
            partition_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_members(&self, members: Vec<Member>) {
        *self.members.lock().unwrap() = members;
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_partition_count(&self, count: i32) {
        *self.partition_count.lock().unwrap() = count;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_next_partition_calls(&self, count: usize) {
        self.fail_next_partition_calls.store(count, Ordering::SeqCst);
    }

    pub fn set_metadata_delay(&self, delay: Option<Duration>) {
        *self.metadata_delay.lock().unwrap() = delay;
    }

    /// 设置某个映射在某个分区上的权威序列号和分区所有者标识
    pub fn set_partition_metadata(&self, name: &str, partition_id: i32, sequence: i64, uuid: Uuid) {
        let mut metadata = self.metadata.lock().unwrap();
        let sequences = metadata
            .name_partition_sequences
            .entry(name.to_string())
            .or_default();
        sequences.retain(|(p, _)| *p != partition_id);
        sequences.push((partition_id, sequence));
        metadata.partition_uuids.insert(partition_id, uuid);
    }

    pub fn partition_calls(&self) -> usize {
        self.partition_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn partition_response(&self) -> PartitionTableResponse {
        let count = *self.partition_count.lock().unwrap();
        let owner = self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| !m.lite_member)
            .map(|m| m.address.clone())
            .unwrap_or_else(|| Address::new("127.0.0.1", 5701));
        PartitionTableResponse {
            owners: vec![(owner, (0..count).collect())],
            version: 1,
        }
    }
}

#[async_trait]
impl InvocationService for FakeCluster {
    async fn invoke(
        &self,
        request: ClusterRequest,
        _target: Option<Address>,
    ) -> Result<ClusterResponse> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NearCacheError::Invocation("connection refused".to_string()));
        }
        match request {
            ClusterRequest::GetPartitions => {
                self.partition_calls.fetch_add(1, Ordering::SeqCst);
                let pending = self.fail_next_partition_calls.load(Ordering::SeqCst);
                if pending > 0 {
                    self.fail_next_partition_calls
                        .store(pending - 1, Ordering::SeqCst);
                    return Err(NearCacheError::Invocation("member not ready".to_string()));
                }
                Ok(ClusterResponse::Partitions(self.partition_response()))
            }
            ClusterRequest::FetchInvalidationMetadata { names } => {
                self.metadata_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.metadata_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let metadata = self.metadata.lock().unwrap().clone();
                let mut response = InvalidationMetadata {
                    partition_uuids: metadata.partition_uuids.clone(),
                    ..Default::default()
                };
                for name in names {
                    if let Some(sequences) = metadata.name_partition_sequences.get(&name) {
                        response
                            .name_partition_sequences
                            .insert(name, sequences.clone());
                    }
                }
                Ok(ClusterResponse::InvalidationMetadata(response))
            }
        }
    }
}

impl ClusterView for FakeCluster {
    fn members(&self) -> Vec<Member> {
        self.members.lock().unwrap().clone()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// 创建连接到模拟集群的分区路由（未启动刷新循环）
pub fn create_router(cluster: &Arc<FakeCluster>) -> Arc<PartitionRouter> {
    Arc::new(PartitionRouter::new(
        PartitionConfig {
            fetch_retry_delay_ms: 10,
            ..Default::default()
        },
        cluster.clone(),
        cluster.clone(),
        SerializerEnum::default(),
    ))
}
