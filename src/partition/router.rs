//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分区路由：键 -> 分区，分区 -> 所有者。
//!
//! 分区表由后台循环定期刷新（默认10秒），也可以按需触发刷新。
//! 读取方直接拿到当前快照的引用，不加锁。

use super::murmur::hash_to_index;
use super::table::PartitionTable;
use crate::cluster::{
    invoke_with_timeout, Address, ClusterRequest, ClusterResponse, ClusterView, InvocationService,
    PartitionTableResponse,
};
use crate::config::PartitionConfig;
use crate::error::{NearCacheError, Result};
use crate::lifecycle::{BackgroundTask, TaskState};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Data, Serializer, SerializerEnum};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// 分区路由
pub struct PartitionRouter {
    config: PartitionConfig,
    invocation: Arc<dyn InvocationService>,
    cluster: Arc<dyn ClusterView>,
    serializer: SerializerEnum,
    table: ArcSwap<PartitionTable>,
    refresh_requested: Arc<Notify>,
    /// 仅由轻量成员组成的集群只报告一次
    lite_only_reported: AtomicBool,
    task: BackgroundTask,
}

impl PartitionRouter {
    /// 创建分区路由
    ///
    /// # 参数
    ///
    /// * `config` - 分区路由配置
    /// * `invocation` - 调用服务，用于获取分区表
    /// * `cluster` - 集群成员视图
    /// * `serializer` - 将键转换为 `Data` 的序列化器
    pub fn new(
        config: PartitionConfig,
        invocation: Arc<dyn InvocationService>,
        cluster: Arc<dyn ClusterView>,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            config,
            invocation,
            cluster,
            serializer,
            table: ArcSwap::from_pointee(PartitionTable::default()),
            refresh_requested: Arc::new(Notify::new()),
            lite_only_reported: AtomicBool::new(false),
            task: BackgroundTask::new("partition-refresh"),
        }
    }

    /// 首次刷新分区表并启动定期刷新循环
    #[instrument(skip(self), level = "info")]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.config.refresh_interval_ms == 0 {
            return Err(NearCacheError::ConfigError(
                "refresh_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.do_refresh().await;

        let weak: Weak<Self> = Arc::downgrade(self);
        let refresh_requested = self.refresh_requested.clone();
        let period = Duration::from_millis(self.config.refresh_interval_ms);
        self.task
            .spawn(move |cancel| async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("分区表刷新循环收到关闭信号");
                            break;
                        }
                        _ = interval.tick() => {}
                        _ = refresh_requested.notified() => {}
                    }
                    let Some(router) = weak.upgrade() else {
                        break;
                    };
                    router.do_refresh().await;
                }
            })
            .await?;
        info!("分区路由已启动，刷新间隔 {:?}", period);
        Ok(())
    }

    /// 停止刷新循环并等待退出
    pub async fn shutdown(&self) {
        self.task.stop().await;
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// 请求一次异步刷新
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    /// 当前分区表快照
    pub fn snapshot(&self) -> Arc<PartitionTable> {
        self.table.load_full()
    }

    /// 分区数量
    ///
    /// 尚未获取过分区表时会阻塞重试，直到成功、客户端不可连接或关闭。
    /// 返回 `None` 表示路由未知。
    pub async fn partition_count(&self) -> Option<i32> {
        self.wait_for_partitions_fetched_once().await;
        let count = self.table.load().partition_count();
        (count > 0).then_some(count)
    }

    /// 计算序列化键所在的分区
    ///
    /// # 返回值
    ///
    /// 路由未知时返回 `Ok(None)`，调用方应按未命中处理
    #[instrument(skip(self, key), level = "debug")]
    pub async fn partition_id(&self, key: &Data) -> Result<Option<i32>> {
        let Some(count) = self.partition_count().await else {
            return Ok(None);
        };
        Ok(Some(hash_to_index(key.partition_hash()?, count)))
    }

    /// 先序列化再计算分区
    pub async fn partition_id_for_key<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<i32>> {
        let data = self.serializer.to_data(key)?;
        self.partition_id(&data).await
    }

    /// 仅使用当前快照计算分区，不等待
    pub fn try_partition_id(&self, key: &Data) -> Result<Option<i32>> {
        let count = self.table.load().partition_count();
        if count <= 0 {
            return Ok(None);
        }
        Ok(Some(hash_to_index(key.partition_hash()?, count)))
    }

    /// 分区所有者
    pub async fn owner_of(&self, partition_id: i32) -> Option<Address> {
        self.wait_for_partitions_fetched_once().await;
        self.table.load().owner_of(partition_id).cloned()
    }

    /// 从集群获取分区表并整体替换快照
    ///
    /// # 返回值
    ///
    /// 成功替换返回 true；失败只记录日志，由下一次刷新重试
    pub async fn do_refresh(&self) -> bool {
        if !self.cluster.is_alive() {
            trace!("客户端不可连接，跳过分区表刷新");
            return false;
        }

        let timeout = Duration::from_millis(self.config.invocation_timeout_ms);
        match invoke_with_timeout(
            self.invocation.as_ref(),
            ClusterRequest::GetPartitions,
            None,
            timeout,
        )
        .await
        {
            Ok(ClusterResponse::Partitions(response)) => {
                self.process_partition_response(response);
                GLOBAL_METRICS.record_partition_refresh("success");
                true
            }
            Ok(other) => {
                warn!("获取分区表收到非预期响应: {:?}", other);
                GLOBAL_METRICS.record_partition_refresh("failure");
                false
            }
            Err(e) => {
                if self.cluster.is_alive() {
                    debug!("获取分区表失败: {}", e);
                }
                GLOBAL_METRICS.record_partition_refresh("failure");
                false
            }
        }
    }

    fn process_partition_response(&self, response: PartitionTableResponse) {
        let table = PartitionTable::from_response(response);
        trace!(
            "分区表已更新: partitions={}, version={}",
            table.partition_count(),
            table.version()
        );
        self.table.store(Arc::new(table));
    }

    fn is_cluster_formed_by_only_lite_members(&self) -> bool {
        let members = self.cluster.members();
        !members.is_empty() && members.iter().all(|m| m.lite_member)
    }

    async fn wait_for_partitions_fetched_once(&self) {
        let cancel = self.task.cancellation_token();
        let retry_delay = Duration::from_millis(self.config.fetch_retry_delay_ms);

        while self.table.load().is_empty() && self.cluster.is_alive() && !cancel.is_cancelled() {
            if self.is_cluster_formed_by_only_lite_members() {
                if !self.lite_only_reported.swap(true, Ordering::SeqCst) {
                    warn!("集群中所有成员都是轻量成员，无法分配分区，分区路由不可用");
                }
                return;
            }
            if self.do_refresh().await && !self.table.load().is_empty() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(retry_delay) => {}
            }
        }
    }
}
