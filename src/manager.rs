//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存管理器，负责创建和管理一个客户端的所有近端缓存。
//!
//! 管理器持有三个后台循环：分区表刷新、失效修复对账和过期清理。

use crate::cluster::{ClusterView, InvocationService};
use crate::config::Config;
use crate::error::{NearCacheError, Result};
use crate::invalidation::{RepairingHandler, RepairingTask};
use crate::lifecycle::{BackgroundTask, TaskState};
use crate::nearcache::NearCache;
use crate::partition::PartitionRouter;
use crate::serialization::SerializerEnum;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, instrument};

/// 近端缓存管理器
pub struct NearCacheManager {
    config: Config,
    serializer: SerializerEnum,
    router: Arc<PartitionRouter>,
    repairing: Arc<RepairingTask>,
    caches: DashMap<String, Arc<NearCache>>,
    expiration: BackgroundTask,
}

impl NearCacheManager {
    /// 创建管理器
    ///
    /// # 参数
    ///
    /// * `config` - 客户端配置，创建时验证
    /// * `invocation` - 调用服务
    /// * `cluster` - 集群成员视图
    ///
    /// # 返回值
    ///
    /// 配置非法时返回 `NearCacheError::ConfigError`
    pub fn new(
        config: Config,
        invocation: Arc<dyn InvocationService>,
        cluster: Arc<dyn ClusterView>,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(NearCacheError::ConfigError)?;

        let serializer = SerializerEnum::default();
        let router = Arc::new(PartitionRouter::new(
            config.partition.clone(),
            invocation.clone(),
            cluster.clone(),
            serializer.clone(),
        ));
        let repairing = Arc::new(RepairingTask::new(
            config.repairing.clone(),
            invocation,
            cluster,
        ));

        Ok(Arc::new(Self {
            config,
            serializer,
            router,
            repairing,
            caches: DashMap::new(),
            expiration: BackgroundTask::new("expiration"),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<PartitionRouter> {
        &self.router
    }

    pub fn repairing_task(&self) -> &Arc<RepairingTask> {
        &self.repairing
    }

    /// 启动分区表刷新、修复对账和过期清理循环
    #[instrument(skip(self), level = "info", fields(near_caches = self.config.near_caches.len()))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.router.start().await?;
        self.repairing.start().await?;

        let period_ms = self.config.global.expiration_task_period_ms;
        if period_ms > 0 {
            let weak: Weak<Self> = Arc::downgrade(self);
            let period = Duration::from_millis(period_ms);
            self.expiration
                .spawn(move |cancel| async move {
                    let mut interval = interval_at(Instant::now() + period, period);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = interval.tick() => {}
                        }
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        let expired = manager.do_expiration();
                        if expired > 0 {
                            debug!("过期清理移除 {} 条", expired);
                        }
                    }
                })
                .await?;
        }

        info!("近端缓存管理器已启动");
        Ok(())
    }

    /// 对所有近端缓存执行一次过期清理
    pub fn do_expiration(&self) -> usize {
        self.caches
            .iter()
            .map(|entry| entry.value().store().do_expiration())
            .sum()
    }

    /// 获取或创建近端缓存
    ///
    /// 使用名称匹配的配置，没有匹配时使用默认配置。
    /// `invalidate_on_change` 开启时创建修复处理器并注册到修复任务。
    pub fn get_or_create(&self, name: &str) -> Result<Arc<NearCache>> {
        if let Some(existing) = self.caches.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        let config = self
            .config
            .near_cache_config(name)
            .cloned()
            .unwrap_or_default();

        match self.caches.entry(name.to_string()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(vacant) => {
                let invalidate_on_change = config.invalidate_on_change;
                let cache = Arc::new(NearCache::new(
                    name,
                    config,
                    self.serializer.clone(),
                    self.router.clone(),
                    self.config.global.enable_metrics,
                )?);
                if invalidate_on_change {
                    let handler = Arc::new(RepairingHandler::new(name, cache.store().clone()));
                    handler.register_with(&self.repairing);
                }
                vacant.insert(cache.clone());
                info!("已创建近端缓存: {}", name);
                Ok(cache)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<NearCache>> {
        self.caches.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 销毁近端缓存：注销修复处理器并清空存储
    pub fn destroy(&self, name: &str) -> bool {
        self.repairing.deregister_handler(name);
        match self.caches.remove(name) {
            Some((_, cache)) => {
                cache.clear();
                info!("已销毁近端缓存: {}", name);
                true
            }
            None => false,
        }
    }

    /// 清空所有近端缓存的内容
    pub fn clear_all(&self) -> usize {
        self.caches.iter().map(|entry| entry.value().clear()).sum()
    }

    pub fn destroy_all(&self) {
        for name in self.list() {
            self.destroy(&name);
        }
    }

    /// 停止所有后台循环并等待退出，然后销毁所有近端缓存
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) {
        tokio::join!(
            self.router.shutdown(),
            self.repairing.shutdown(),
            self.expiration.stop()
        );
        self.destroy_all();
        info!("近端缓存管理器已关闭");
    }

    pub fn expiration_state(&self) -> TaskState {
        self.expiration.state()
    }
}
