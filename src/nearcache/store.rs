//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 有界的键 -> 记录 容器。
//!
//! 结构性修改（插入/删除）由 `DashMap` 的分片锁保护，记录字段通过比较交换修改，
//! 读取方不阻塞写入方。准入（可能触发淘汰的插入）在一个互斥锁下串行执行，
//! 保证每次写入完成后条目数不超过上限。

use super::record::{CachedValue, NearCacheRecord, RecordState, ReservationId};
use crate::config::NearCacheConfig;
use crate::error::{NearCacheError, Result};
use crate::eviction::EvictionPolicyEvaluator;
use crate::serialization::Data;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// 读取时的陈旧检测
///
/// 由失效修复处理器实现，新记录创建时用 `current` 打上标记
pub trait StaleReadDetector: Send + Sync {
    /// 分区当前的 `(序列号, 所有者标识)`，未知时返回 `None`
    fn current(&self, partition_id: i32) -> Option<(i64, Uuid)>;

    /// 记录是否已经陈旧
    fn is_stale_read(&self, record: &NearCacheRecord) -> bool;
}

#[derive(Debug, Default)]
struct NearCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NearCacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub owned_entry_count: usize,
}

/// 近端缓存存储
pub struct NearCacheStore {
    name: String,
    config: NearCacheConfig,
    records: DashMap<Data, Arc<NearCacheRecord>>,
    evaluator: EvictionPolicyEvaluator,
    admission: Mutex<()>,
    epoch: Instant,
    stats: NearCacheStats,
    stale_read_detector: OnceLock<Arc<dyn StaleReadDetector>>,
}

impl NearCacheStore {
    /// 创建存储
    ///
    /// # 参数
    ///
    /// * `name` - 近端缓存名称（映射名称）
    /// * `config` - 近端缓存配置，非法配置在此处拒绝
    pub fn new(name: impl Into<String>, config: NearCacheConfig) -> Result<Self> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| NearCacheError::ConfigError(format!("near cache '{}': {}", name, e)))?;
        Ok(Self {
            evaluator: EvictionPolicyEvaluator::new(config.eviction_policy),
            name,
            config,
            records: DashMap::new(),
            admission: Mutex::new(()),
            epoch: Instant::now(),
            stats: NearCacheStats::default(),
            stale_read_detector: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    /// 设置陈旧读取检测器，只能设置一次
    pub fn set_stale_read_detector(&self, detector: Arc<dyn StaleReadDetector>) -> bool {
        self.stale_read_detector.set(detector).is_ok()
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn stamp(&self, partition_id: i32) -> Option<(i64, Uuid)> {
        self.stale_read_detector
            .get()
            .and_then(|detector| detector.current(partition_id))
    }

    fn lookup(&self, key: &Data) -> Option<Arc<NearCacheRecord>> {
        self.records.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// 读取
    ///
    /// 只有 `ReadPermitted` 的记录可读；过期、空闲超时或陈旧的记录按未命中处理并在此处移除
    pub fn get(&self, key: &Data) -> Option<CachedValue> {
        let Some(record) = self.lookup(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let Some(value) = record.value().cloned() else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = self.now();
        if record.is_expired_at(self.config.time_to_live(), now)
            || record.is_idle_at(self.config.max_idle(), now)
        {
            if self.remove_record(&record) {
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            trace!("近端缓存 {} 记录已过期: {:?}", self.name, key);
            return None;
        }

        if let Some(detector) = self.stale_read_detector.get() {
            if detector.is_stale_read(&record) {
                if self.remove_record(&record) {
                    self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!("近端缓存 {} 记录已陈旧: {:?}", self.name, key);
                return None;
            }
        }

        record.record_access(now);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// 直接写入一个可读记录，替换已有记录
    ///
    /// 容量已满且键不存在时先淘汰。淘汰策略为 `None` 时不按容量淘汰。
    pub fn put(&self, key: Data, value: CachedValue, partition_id: i32) {
        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        self.make_room_for(&key);

        let record = Arc::new(NearCacheRecord::published(
            key.clone(),
            value,
            self.now(),
            partition_id,
            self.stamp(partition_id),
        ));
        if let Some(previous) = self.records.insert(key, record) {
            previous.invalidate();
        }
    }

    /// 尝试为更新预留键
    ///
    /// # 返回值
    ///
    /// 键不存在时恰好一个并发调用方获得预留标识，其余返回 `None`
    pub fn try_reserve_for_update(&self, key: Data, partition_id: i32) -> Option<ReservationId> {
        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        self.make_room_for(&key);

        let now = self.now();
        match self.records.entry(key) {
            Entry::Occupied(mut occupied) => {
                // 被放弃的预留就地回收，其余情况预留失败
                if !self.is_abandoned_reservation(occupied.get(), now) {
                    return None;
                }
                occupied.get().invalidate();
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                debug!("近端缓存 {} 回收被放弃的预留: {:?}", self.name, occupied.key());

                let reservation_id = ReservationId::next();
                let record = Arc::new(NearCacheRecord::placeholder(
                    occupied.key().clone(),
                    now,
                    partition_id,
                    self.stamp(partition_id),
                    reservation_id,
                ));
                let reserved = record.cas_state(RecordState::NotReserved, RecordState::Reserved);
                occupied.insert(record);
                reserved.then_some(reservation_id)
            }
            Entry::Vacant(vacant) => {
                let reservation_id = ReservationId::next();
                let record = Arc::new(NearCacheRecord::placeholder(
                    vacant.key().clone(),
                    now,
                    partition_id,
                    self.stamp(partition_id),
                    reservation_id,
                ));
                let reserved = record.cas_state(RecordState::NotReserved, RecordState::Reserved);
                vacant.insert(record);
                reserved.then_some(reservation_id)
            }
        }
    }

    /// 标记预留方开始从集群获取值
    pub fn try_start_update(&self, key: &Data, reservation_id: ReservationId) -> bool {
        match self.lookup(key) {
            Some(record) if record.reservation_id() == Some(reservation_id) => {
                record.cas_state(RecordState::Reserved, RecordState::UpdateStarted)
            }
            _ => false,
        }
    }

    /// 发布预留方获取到的值
    ///
    /// # 返回值
    ///
    /// 预留在此期间被失效或被其他预留取代时返回 false，值被丢弃
    pub fn try_publish_reserved_record(
        &self,
        key: &Data,
        value: CachedValue,
        reservation_id: ReservationId,
    ) -> bool {
        let Some(record) = self.lookup(key) else {
            return false;
        };
        if record.reservation_id() != Some(reservation_id) {
            return false;
        }
        if !record.cas_state(RecordState::Reserved, RecordState::UpdateStarted)
            && record.state() != RecordState::UpdateStarted
        {
            return false;
        }
        if !record.install(value, self.now()) {
            return false;
        }
        if record.cas_state(RecordState::UpdateStarted, RecordState::ReadPermitted) {
            true
        } else {
            self.records
                .remove_if(key, |_, current| Arc::ptr_eq(current, &record));
            debug!("近端缓存 {} 的预留在发布前已失效: {:?}", self.name, key);
            false
        }
    }

    /// 释放未完成的预留
    pub fn cancel_reservation(&self, key: &Data, reservation_id: ReservationId) -> bool {
        let Some(record) = self.lookup(key) else {
            return false;
        };
        if record.reservation_id() != Some(reservation_id)
            || record.state() == RecordState::ReadPermitted
        {
            return false;
        }
        record.invalidate();
        self.records
            .remove_if(key, |_, current| Arc::ptr_eq(current, &record))
            .is_some()
    }

    /// 失效单个键
    #[instrument(skip(self, key), level = "trace", fields(cache = %self.name))]
    pub fn invalidate(&self, key: &Data) -> bool {
        let Some(record) = self.lookup(key) else {
            return false;
        };
        let removed = self.remove_record(&record);
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// 清空某个分区的全部记录
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub fn clear_partition(&self, partition_id: i32) -> usize {
        let mut cleared = 0;
        self.records.retain(|_, record| {
            if record.partition_id() == partition_id {
                record.invalidate();
                cleared += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .invalidations
            .fetch_add(cleared as u64, Ordering::Relaxed);
        debug!("近端缓存 {} 已清空分区 {}: {} 条", self.name, partition_id, cleared);
        cleared
    }

    /// 清空全部记录
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub fn clear_all(&self) -> usize {
        let mut cleared = 0;
        self.records.retain(|_, record| {
            record.invalidate();
            cleared += 1;
            false
        });
        self.stats
            .invalidations
            .fetch_add(cleared as u64, Ordering::Relaxed);
        debug!("近端缓存 {} 已全部清空: {} 条", self.name, cleared);
        cleared
    }

    /// 未发布的预留是否已超过存活、空闲或预留时限
    fn is_abandoned_reservation(&self, record: &NearCacheRecord, now: u64) -> bool {
        record.state() != RecordState::ReadPermitted
            && (record.is_expired_at(self.config.time_to_live(), now)
                || record.is_idle_at(self.config.max_idle(), now)
                || record.is_expired_at(self.config.reservation_timeout(), now))
    }

    /// 移除所有已过期或空闲超时的可读记录，并回收被放弃的预留
    pub fn do_expiration(&self) -> usize {
        let ttl = self.config.time_to_live();
        let max_idle = self.config.max_idle();
        if ttl.is_zero() && max_idle.is_zero() && self.config.reservation_timeout().is_zero() {
            return 0;
        }

        let now = self.now();
        let mut expired = 0;
        self.records.retain(|_, record| {
            let dead = if record.state() == RecordState::ReadPermitted {
                record.is_expired_at(ttl, now) || record.is_idle_at(max_idle, now)
            } else {
                self.is_abandoned_reservation(record, now)
            };
            if dead {
                record.invalidate();
                expired += 1;
            }
            !dead
        });
        if expired > 0 {
            self.stats
                .expirations
                .fetch_add(expired as u64, Ordering::Relaxed);
            trace!("近端缓存 {} 过期清理: {} 条", self.name, expired);
        }
        expired
    }

    /// 当前条目数（包括未完成的预留）
    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn record_state(&self, key: &Data) -> Option<RecordState> {
        self.lookup(key).map(|record| record.state())
    }

    pub fn stats(&self) -> NearCacheStatsSnapshot {
        NearCacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            owned_entry_count: self.records.len(),
        }
    }

    /// 在准入锁内调用：为新键腾出空间
    fn make_room_for(&self, key: &Data) {
        let Some(capacity) = self.config.capacity() else {
            return;
        };
        if !self.evaluator.is_eviction_enabled() {
            return;
        }
        while self.records.len() >= capacity && !self.records.contains_key(key) {
            if !self.evict_one() {
                break;
            }
        }
    }

    fn evict_one(&self) -> bool {
        let victim = self.evaluator.select_victim(
            self.records
                .iter()
                .map(|entry| (Arc::clone(entry.value()), entry.value().eviction_candidate())),
        );
        match victim {
            Some(record) => {
                let removed = self.remove_record(&record);
                if removed {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!("近端缓存 {} 淘汰: {:?}", self.name, record.key());
                }
                removed
            }
            None => false,
        }
    }

    /// 先转为 `NotReserved` 再从映射中移除；映射中的记录已被替换时不动
    fn remove_record(&self, record: &Arc<NearCacheRecord>) -> bool {
        record.invalidate();
        self.records
            .remove_if(record.key(), |_, current| Arc::ptr_eq(current, record))
            .is_some()
    }
}
