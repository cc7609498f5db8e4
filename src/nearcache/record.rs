//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 近端缓存记录及其预留状态机。
//!
//! 状态只通过比较交换迁移：
//! `NotReserved -> Reserved -> UpdateStarted -> ReadPermitted`，
//! 任意状态都可以回到 `NotReserved`（失效优先于进行中的更新）。

use crate::eviction::EvictionCandidate;
use crate::serialization::Data;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// 记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordState {
    /// 不存在（读取方视为未命中）
    NotReserved = 0,
    /// 已被某个调用方预留
    Reserved = 1,
    /// 预留方正在从集群获取值
    UpdateStarted = 2,
    /// 值已发布，可读
    ReadPermitted = 3,
}

impl RecordState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordState::Reserved,
            2 => RecordState::UpdateStarted,
            3 => RecordState::ReadPermitted,
            _ => RecordState::NotReserved,
        }
    }
}

/// 缓存的值
///
/// 二进制格式保存序列化后的 `Data`，对象格式保存反序列化后的对象
#[derive(Clone)]
pub enum CachedValue {
    Binary(Data),
    Object(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachedValue::Binary(data) => f.debug_tuple("Binary").field(data).finish(),
            CachedValue::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// 预留标识
///
/// 只有持有赢得预留的标识的调用方才能发布或取消该预留
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(u64);

static NEXT_RESERVATION_ID: AtomicU64 = AtomicU64::new(1);

impl ReservationId {
    pub(crate) fn next() -> Self {
        ReservationId(NEXT_RESERVATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 近端缓存记录
///
/// 时间戳为相对于所属存储创建时刻的纳秒数
pub struct NearCacheRecord {
    key: Data,
    value: OnceLock<CachedValue>,
    creation_time: AtomicU64,
    last_access_time: AtomicU64,
    access_hit_count: AtomicU32,
    partition_id: i32,
    invalidation_sequence: i64,
    owner_uuid: Option<Uuid>,
    reservation_id: Option<ReservationId>,
    state: AtomicU8,
}

impl NearCacheRecord {
    /// 直接写入的记录，创建后即可读
    pub(crate) fn published(
        key: Data,
        value: CachedValue,
        now: u64,
        partition_id: i32,
        stamp: Option<(i64, Uuid)>,
    ) -> Self {
        let record = Self::with_state(key, now, partition_id, stamp, None, RecordState::ReadPermitted);
        let _ = record.value.set(value);
        record
    }

    /// 预留占位记录，初始状态为 `NotReserved`，由调用方通过比较交换转为 `Reserved`
    pub(crate) fn placeholder(
        key: Data,
        now: u64,
        partition_id: i32,
        stamp: Option<(i64, Uuid)>,
        reservation_id: ReservationId,
    ) -> Self {
        Self::with_state(
            key,
            now,
            partition_id,
            stamp,
            Some(reservation_id),
            RecordState::NotReserved,
        )
    }

    fn with_state(
        key: Data,
        now: u64,
        partition_id: i32,
        stamp: Option<(i64, Uuid)>,
        reservation_id: Option<ReservationId>,
        state: RecordState,
    ) -> Self {
        let (invalidation_sequence, owner_uuid) = match stamp {
            Some((sequence, uuid)) => (sequence, Some(uuid)),
            None => (0, None),
        };
        Self {
            key,
            value: OnceLock::new(),
            creation_time: AtomicU64::new(now),
            last_access_time: AtomicU64::new(now),
            access_hit_count: AtomicU32::new(0),
            partition_id,
            invalidation_sequence,
            owner_uuid,
            reservation_id,
            state: AtomicU8::new(state as u8),
        }
    }

    pub fn key(&self) -> &Data {
        &self.key
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn invalidation_sequence(&self) -> i64 {
        self.invalidation_sequence
    }

    pub fn owner_uuid(&self) -> Option<Uuid> {
        self.owner_uuid
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.reservation_id
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time.load(Ordering::Acquire)
    }

    pub fn last_access_time(&self) -> u64 {
        self.last_access_time.load(Ordering::Acquire)
    }

    pub fn access_hit_count(&self) -> u32 {
        self.access_hit_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RecordState {
        RecordState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 比较交换状态
    pub fn cas_state(&self, expected: RecordState, new: RecordState) -> bool {
        self.state
            .compare_exchange(expected as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 当前可读的值，仅在 `ReadPermitted` 状态下返回
    pub fn value(&self) -> Option<&CachedValue> {
        if self.state() != RecordState::ReadPermitted {
            return None;
        }
        self.value.get()
    }

    /// 安装预留方获取的值
    ///
    /// 只能在 `UpdateStarted` 状态下调用，重置创建时间和命中次数
    pub(crate) fn install(&self, value: CachedValue, now: u64) -> bool {
        if self.value.set(value).is_err() {
            return false;
        }
        self.creation_time.store(now, Ordering::Release);
        self.last_access_time.store(now, Ordering::Release);
        self.access_hit_count.store(0, Ordering::Release);
        true
    }

    /// 按存活时间判断是否过期，边界 `now - creation == ttl` 仍然有效
    pub fn is_expired_at(&self, ttl: Duration, now: u64) -> bool {
        if ttl.is_zero() {
            return false;
        }
        now.saturating_sub(self.creation_time()) > ttl.as_nanos() as u64
    }

    /// 按最大空闲时间判断是否过期
    pub fn is_idle_at(&self, max_idle: Duration, now: u64) -> bool {
        if max_idle.is_zero() {
            return false;
        }
        now.saturating_sub(self.last_access_time()) > max_idle.as_nanos() as u64
    }

    /// 记录一次命中
    ///
    /// 竞争下丢失的计数可以接受
    pub fn record_access(&self, now: u64) {
        let _ = self
            .last_access_time
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (now > last).then_some(now)
            });
        let _ = self
            .access_hit_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |hits| {
                Some(hits.saturating_add(1))
            });
    }

    /// 将记录转回 `NotReserved`
    ///
    /// # 返回值
    ///
    /// 记录之前可读时返回 true
    pub fn invalidate(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == RecordState::NotReserved as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                RecordState::NotReserved as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return previous == RecordState::ReadPermitted as u8,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn eviction_candidate(&self) -> EvictionCandidate {
        EvictionCandidate {
            creation_time: self.creation_time(),
            last_access_time: self.last_access_time(),
            access_hit_count: self.access_hit_count(),
        }
    }
}

impl fmt::Debug for NearCacheRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearCacheRecord")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("partition_id", &self.partition_id)
            .field("invalidation_sequence", &self.invalidation_sequence)
            .field("owner_uuid", &self.owner_uuid)
            .field("creation_time", &self.creation_time())
            .field("last_access_time", &self.last_access_time())
            .field("access_hit_count", &self.access_hit_count())
            .finish()
    }
}
