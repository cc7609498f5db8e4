//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 按映射名称划分的近端缓存门面。
//!
//! 负责键值的序列化、内存格式转换和分区计算，实际存储委托给 `NearCacheStore`。

use super::record::{CachedValue, ReservationId};
use super::store::{NearCacheStatsSnapshot, NearCacheStore};
use crate::config::{InMemoryFormat, NearCacheConfig};
use crate::error::{NearCacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::partition::PartitionRouter;
use crate::serialization::{Data, Serializer, SerializerEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 预留凭证
///
/// 由 `try_reserve_for_update` 返回，发布或取消时消耗
#[derive(Debug, Clone)]
pub struct Reservation {
    key: Data,
    id: ReservationId,
}

impl Reservation {
    pub fn key(&self) -> &Data {
        &self.key
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }
}

/// 近端缓存
pub struct NearCache {
    name: String,
    store: Arc<NearCacheStore>,
    serializer: SerializerEnum,
    router: Arc<PartitionRouter>,
    enable_metrics: bool,
}

impl NearCache {
    /// 创建近端缓存
    ///
    /// # 参数
    ///
    /// * `name` - 映射名称
    /// * `config` - 近端缓存配置
    /// * `serializer` - 键值序列化器
    /// * `router` - 客户端共享的分区路由
    /// * `enable_metrics` - 是否记录全局指标
    pub fn new(
        name: impl Into<String>,
        config: NearCacheConfig,
        serializer: SerializerEnum,
        router: Arc<PartitionRouter>,
        enable_metrics: bool,
    ) -> Result<Self> {
        let name = name.into();
        let store = Arc::new(NearCacheStore::new(name.clone(), config)?);
        Ok(Self {
            name,
            store,
            serializer,
            router,
            enable_metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NearCacheConfig {
        self.store.config()
    }

    pub fn store(&self) -> &Arc<NearCacheStore> {
        &self.store
    }

    fn record(&self, op: &str, result: &str) {
        if self.enable_metrics {
            GLOBAL_METRICS.record_request(&self.name, op, result);
        }
    }

    fn to_cached<V>(&self, value: &V) -> Result<CachedValue>
    where
        V: Serialize + Clone + Send + Sync + 'static,
    {
        match self.store.config().in_memory_format {
            InMemoryFormat::Binary => Ok(CachedValue::Binary(self.serializer.to_data(value)?)),
            InMemoryFormat::Object => Ok(CachedValue::Object(Arc::new(value.clone()))),
        }
    }

    fn from_cached<V>(&self, value: CachedValue) -> Result<V>
    where
        V: DeserializeOwned + Clone + 'static,
    {
        match value {
            CachedValue::Binary(data) => self.serializer.to_object(&data),
            CachedValue::Object(object) => {
                let object: &dyn Any = object.as_ref();
                object.downcast_ref::<V>().cloned().ok_or_else(|| {
                    NearCacheError::Serialization(format!(
                        "cached object in '{}' is not a {}",
                        self.name,
                        std::any::type_name::<V>()
                    ))
                })
            }
        }
    }

    /// 读取
    ///
    /// # 返回值
    ///
    /// 未命中返回 `Ok(None)`，调用方应回退到集群读取
    pub fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned + Clone + 'static,
    {
        let key = self.serializer.to_data(key)?;
        match self.store.get(&key) {
            Some(value) => {
                self.record("get", "hit");
                self.from_cached(value).map(Some)
            }
            None => {
                self.record("get", "miss");
                Ok(None)
            }
        }
    }

    /// 写入
    ///
    /// # 返回值
    ///
    /// 分区路由未知时不缓存并返回 `Ok(false)`
    #[instrument(skip(self, key, value), level = "debug", fields(cache = %self.name))]
    pub async fn put<K, V>(&self, key: &K, value: &V) -> Result<bool>
    where
        K: Serialize + ?Sized,
        V: Serialize + Clone + Send + Sync + 'static,
    {
        let key = self.serializer.to_data(key)?;
        let Some(partition_id) = self.router.partition_id(&key).await? else {
            debug!("分区路由未知，跳过缓存: {}", self.name);
            self.record("put", "skipped");
            return Ok(false);
        };
        let value = self.to_cached(value)?;
        self.store.put(key, value, partition_id);
        self.record("put", "ok");
        Ok(true)
    }

    /// 为更新预留键
    ///
    /// # 返回值
    ///
    /// 预留失败（已缓存、已被他人预留或路由未知）返回 `Ok(None)`
    pub async fn try_reserve_for_update<K>(&self, key: &K) -> Result<Option<Reservation>>
    where
        K: Serialize + ?Sized,
    {
        let key = self.serializer.to_data(key)?;
        let Some(partition_id) = self.router.partition_id(&key).await? else {
            self.record("reserve", "skipped");
            return Ok(None);
        };
        match self.store.try_reserve_for_update(key.clone(), partition_id) {
            Some(id) => {
                self.record("reserve", "ok");
                Ok(Some(Reservation { key, id }))
            }
            None => {
                self.record("reserve", "rejected");
                Ok(None)
            }
        }
    }

    /// 发布预留方获取到的值
    pub fn try_publish_reserved<V>(&self, reservation: Reservation, value: &V) -> Result<bool>
    where
        V: Serialize + Clone + Send + Sync + 'static,
    {
        let cached = self.to_cached(value)?;
        let published =
            self.store
                .try_publish_reserved_record(&reservation.key, cached, reservation.id);
        self.record("publish", if published { "ok" } else { "rejected" });
        Ok(published)
    }

    /// 放弃预留（例如集群读取失败）
    pub fn cancel_reservation(&self, reservation: Reservation) -> bool {
        self.store
            .cancel_reservation(&reservation.key, reservation.id)
    }

    /// 失效单个键
    pub fn invalidate<K>(&self, key: &K) -> Result<bool>
    where
        K: Serialize + ?Sized,
    {
        let key = self.serializer.to_data(key)?;
        let invalidated = self.store.invalidate(&key);
        self.record("invalidate", if invalidated { "ok" } else { "absent" });
        Ok(invalidated)
    }

    pub fn clear(&self) -> usize {
        self.store.clear_all()
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn stats(&self) -> NearCacheStatsSnapshot {
        self.store.stats()
    }
}
