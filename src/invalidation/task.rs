//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 反熵对账任务：每个客户端一个，所有近端缓存的修复处理器共享。

use super::handler::RepairingHandler;
use crate::cluster::{
    invoke_with_timeout, ClusterRequest, ClusterResponse, ClusterView, InvalidationMetadata,
    InvocationService,
};
use crate::config::RepairingConfig;
use crate::error::{NearCacheError, Result};
use crate::lifecycle::{BackgroundTask, TaskState};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, instrument, trace, warn};

/// 一次对账的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairTickReport {
    /// 参与对账的处理器数
    pub handlers: usize,
    /// 成功返回元数据的成员数
    pub responding_members: usize,
    /// 被清空的分区总数
    pub cleared_partitions: usize,
    /// 整体清空的处理器数
    pub full_clears: usize,
    /// 对账期间被注销、结果被丢弃的处理器数
    pub discarded: usize,
}

/// 失效修复任务
pub struct RepairingTask {
    config: RepairingConfig,
    invocation: Arc<dyn InvocationService>,
    cluster: Arc<dyn ClusterView>,
    handlers: DashMap<String, Arc<RepairingHandler>>,
    task: BackgroundTask,
}

impl RepairingTask {
    /// 创建修复任务
    ///
    /// # 参数
    ///
    /// * `config` - 修复配置
    /// * `invocation` - 调用服务，用于获取失效元数据
    /// * `cluster` - 集群成员视图
    pub fn new(
        config: RepairingConfig,
        invocation: Arc<dyn InvocationService>,
        cluster: Arc<dyn ClusterView>,
    ) -> Self {
        Self {
            config,
            invocation,
            cluster,
            handlers: DashMap::new(),
            task: BackgroundTask::new("repairing"),
        }
    }

    /// 注册处理器，下一次对账开始生效
    pub fn register_handler(&self, handler: Arc<RepairingHandler>) {
        debug!("注册修复处理器: {}", handler.name());
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// 注销处理器，立即生效
    pub fn deregister_handler(&self, name: &str) -> Option<Arc<RepairingHandler>> {
        let removed = self.handlers.remove(name).map(|(_, handler)| handler);
        if removed.is_some() {
            debug!("注销修复处理器: {}", name);
        }
        removed
    }

    pub fn handler(&self, name: &str) -> Option<Arc<RepairingHandler>> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// 启动周期对账循环
    ///
    /// 对账间隔为 0 时返回 `ConfigError`，任务保持未启动
    #[instrument(skip(self), level = "info")]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.config.reconciliation_interval_ms == 0 {
            return Err(NearCacheError::ConfigError(
                "reconciliation_interval_ms must be greater than 0".to_string(),
            ));
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.reconciliation_interval_ms);
        self.task
            .spawn(move |cancel| async move {
                let mut interval = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("修复循环收到关闭信号");
                            break;
                        }
                        _ = interval.tick() => {}
                    }
                    let Some(task) = weak.upgrade() else {
                        break;
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = task.run_once() => {}
                    }
                }
            })
            .await?;
        info!("修复任务已启动，对账间隔 {:?}", period);
        Ok(())
    }

    /// 停止对账循环并等待退出
    pub async fn shutdown(&self) {
        self.task.stop().await;
    }

    /// 执行一次对账
    ///
    /// 获取失败只记录日志，等待下一次对账
    #[instrument(skip(self), level = "debug")]
    pub async fn run_once(&self) -> RepairTickReport {
        let handlers: Vec<Arc<RepairingHandler>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut report = RepairTickReport {
            handlers: handlers.len(),
            ..Default::default()
        };
        if handlers.is_empty() || !self.cluster.is_alive() {
            return report;
        }

        let names: Vec<String> = handlers.iter().map(|h| h.name().to_string()).collect();
        let Some((metadata, responding)) = self.fetch_metadata(names).await else {
            return report;
        };
        report.responding_members = responding;

        for handler in handlers {
            let still_registered = self
                .handlers
                .get(handler.name())
                .is_some_and(|current| Arc::ptr_eq(current.value(), &handler));
            if !still_registered {
                trace!("处理器 {} 已在对账期间注销，丢弃结果", handler.name());
                report.discarded += 1;
                continue;
            }

            let outcome = handler.reconcile(&metadata, self.config.max_tolerated_stale_partitions);
            report.cleared_partitions += outcome.cleared_partitions.len();
            if outcome.full_clear {
                report.full_clears += 1;
            }
        }

        trace!("对账完成: {:?}", report);
        report
    }

    async fn fetch_metadata(&self, names: Vec<String>) -> Option<(InvalidationMetadata, usize)> {
        let members: Vec<_> = self
            .cluster
            .members()
            .into_iter()
            .filter(|member| !member.lite_member)
            .collect();
        if members.is_empty() {
            trace!("没有可拥有分区的成员，跳过对账");
            return None;
        }

        let timeout = Duration::from_millis(self.config.invocation_timeout_ms);
        let requests = members.iter().map(|member| {
            invoke_with_timeout(
                self.invocation.as_ref(),
                ClusterRequest::FetchInvalidationMetadata {
                    names: names.clone(),
                },
                Some(member.address.clone()),
                timeout,
            )
        });
        let results = join_all(requests).await;

        let mut merged = InvalidationMetadata::default();
        let mut responding = 0;
        for (member, result) in members.iter().zip(results) {
            match result {
                Ok(ClusterResponse::InvalidationMetadata(metadata)) => {
                    merged.merge(metadata);
                    responding += 1;
                }
                Ok(other) => {
                    warn!("成员 {} 返回非预期的失效元数据响应: {:?}", member.address, other);
                }
                Err(e) => {
                    debug!("从成员 {} 获取失效元数据失败: {}", member.address, e);
                }
            }
        }

        if responding == 0 {
            debug!("所有成员获取失效元数据均失败，等待下一次对账");
            return None;
        }
        Some((merged, responding))
    }
}
