//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 每个近端缓存的失效序列记账。
//!
//! 每个分区保存 `(最后序列号, 所有者标识, 陈旧标记)`，整体以 `ArcSwap` 比较交换更新，
//! 不同分区之间互不争用。

use super::task::RepairingTask;
use crate::cluster::InvalidationMetadata;
use crate::metrics::GLOBAL_METRICS;
use crate::nearcache::{NearCacheRecord, NearCacheStore, StaleReadDetector};
use crate::serialization::Data;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 分区元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionMetaData {
    pub sequence: i64,
    pub uuid: Option<Uuid>,
    pub stale: bool,
    /// 因序列号缺口累计错过的事件数
    pub missed: i64,
    /// 首次得知所有者标识时的序列号；此前写入、未带标记的记录视为在该序列号处标记
    pub baseline: i64,
}

/// 失效事件作用的范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// 单个键
    Key(Data),
    /// 事件所在分区的全部键
    Partition,
    /// 整个近端缓存
    All,
}

/// 单个失效事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 预期的下一个事件，或首次见到该分区
    Applied,
    /// 重复或乱序重放，已忽略
    Duplicate,
    /// 检测到序列号缺口，分区已标记为陈旧
    Gap { missed: i64 },
    /// 分区所有者变更，分区已清空
    OwnershipChanged,
    /// 非法分区号，已忽略
    Ignored,
}

/// 一次对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// 被清空的分区
    pub cleared_partitions: Vec<i32>,
    /// 是否整体清空
    pub full_clear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileAction {
    None,
    Adopt,
    Clear,
}

fn next_on_event(current: &PartitionMetaData, sequence: i64, source: Uuid) -> (PartitionMetaData, ApplyOutcome) {
    match current.uuid {
        None => (
            PartitionMetaData {
                sequence,
                uuid: Some(source),
                baseline: sequence,
                ..*current
            },
            ApplyOutcome::Applied,
        ),
        Some(uuid) if uuid != source => (
            PartitionMetaData {
                sequence,
                uuid: Some(source),
                stale: false,
                ..*current
            },
            ApplyOutcome::OwnershipChanged,
        ),
        Some(_) if sequence <= current.sequence => (*current, ApplyOutcome::Duplicate),
        Some(_) if sequence == current.sequence + 1 => (
            PartitionMetaData {
                sequence,
                ..*current
            },
            ApplyOutcome::Applied,
        ),
        Some(_) => {
            let missed = sequence - current.sequence - 1;
            (
                PartitionMetaData {
                    sequence,
                    stale: true,
                    missed: current.missed + missed,
                    ..*current
                },
                ApplyOutcome::Gap { missed },
            )
        }
    }
}

fn next_on_reconcile(
    current: &PartitionMetaData,
    sequence: i64,
    uuid: Option<Uuid>,
) -> (PartitionMetaData, ReconcileAction) {
    let Some(current_uuid) = current.uuid else {
        let sequence = sequence.max(current.sequence);
        return (
            PartitionMetaData {
                sequence,
                uuid,
                stale: false,
                missed: current.missed,
                baseline: sequence,
            },
            ReconcileAction::Adopt,
        );
    };

    let uuid_changed = uuid.is_some_and(|u| u != current_uuid);
    if uuid_changed {
        return (
            PartitionMetaData {
                sequence,
                uuid,
                stale: false,
                ..*current
            },
            ReconcileAction::Clear,
        );
    }
    if sequence > current.sequence || current.stale {
        return (
            PartitionMetaData {
                sequence: sequence.max(current.sequence),
                stale: false,
                ..*current
            },
            ReconcileAction::Clear,
        );
    }
    (*current, ReconcileAction::None)
}

/// 分区元数据表，同时作为存储的陈旧读取检测器
#[derive(Debug, Default)]
pub struct MetaDataTable {
    partitions: DashMap<i32, Arc<ArcSwap<PartitionMetaData>>>,
}

impl MetaDataTable {
    fn container(&self, partition_id: i32) -> Arc<ArcSwap<PartitionMetaData>> {
        // 已存在的分区只取分片读锁
        if let Some(container) = self.partitions.get(&partition_id) {
            return Arc::clone(container.value());
        }
        self.partitions
            .entry(partition_id)
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(PartitionMetaData::default())))
            .value()
            .clone()
    }

    pub fn get(&self, partition_id: i32) -> Option<PartitionMetaData> {
        self.partitions
            .get(&partition_id)
            .map(|container| **container.value().load())
    }

    pub fn stale_partitions(&self) -> Vec<i32> {
        let mut stale: Vec<i32> = self
            .partitions
            .iter()
            .filter(|entry| entry.value().load().stale)
            .map(|entry| *entry.key())
            .collect();
        stale.sort_unstable();
        stale
    }
}

impl StaleReadDetector for MetaDataTable {
    fn current(&self, partition_id: i32) -> Option<(i64, Uuid)> {
        let metadata = self.get(partition_id)?;
        metadata.uuid.map(|uuid| (metadata.sequence, uuid))
    }

    fn is_stale_read(&self, record: &NearCacheRecord) -> bool {
        let Some(metadata) = self.get(record.partition_id()) else {
            return false;
        };
        let Some(uuid) = metadata.uuid else {
            return false;
        };
        let (sequence, owner) = match record.owner_uuid() {
            Some(owner) => (record.invalidation_sequence(), owner),
            None => (metadata.baseline, uuid),
        };
        if owner != uuid {
            return true;
        }
        metadata.stale && sequence < metadata.sequence
    }
}

/// 失效修复处理器
pub struct RepairingHandler {
    name: String,
    store: Arc<NearCacheStore>,
    metadata: Arc<MetaDataTable>,
}

impl RepairingHandler {
    /// 创建处理器并把元数据表挂到存储上作为陈旧读取检测器
    pub fn new(name: impl Into<String>, store: Arc<NearCacheStore>) -> Self {
        let name = name.into();
        let metadata = Arc::new(MetaDataTable::default());
        if !store.set_stale_read_detector(metadata.clone()) {
            warn!("近端缓存 {} 已有陈旧读取检测器，保留原检测器", name);
        }
        Self {
            name,
            store,
            metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<NearCacheStore> {
        &self.store
    }

    pub fn metadata(&self, partition_id: i32) -> Option<PartitionMetaData> {
        self.metadata.get(partition_id)
    }

    pub fn stale_partitions(&self) -> Vec<i32> {
        self.metadata.stale_partitions()
    }

    /// 累计错过的事件数
    pub fn missed_sequence_count(&self) -> i64 {
        self.metadata
            .partitions
            .iter()
            .map(|entry| entry.value().load().missed)
            .sum()
    }

    /// 注册到修复任务，下一次对账开始生效
    pub fn register_with(self: &Arc<Self>, task: &RepairingTask) {
        task.register_handler(Arc::clone(self));
    }

    /// 应用单个失效事件
    ///
    /// # 参数
    ///
    /// * `partition_id` - 事件所在分区
    /// * `sequence` - 事件序列号
    /// * `source_uuid` - 发出事件的分区所有者标识
    /// * `target` - 失效范围
    ///
    /// # 返回值
    ///
    /// 事件的处理结果；重复事件不会再次失效任何记录
    #[instrument(skip(self, target), level = "debug", fields(cache = %self.name))]
    pub fn apply(
        &self,
        partition_id: i32,
        sequence: i64,
        source_uuid: Uuid,
        target: InvalidationTarget,
    ) -> ApplyOutcome {
        if partition_id < 0 {
            warn!("忽略非法分区号的失效事件: {}", partition_id);
            return ApplyOutcome::Ignored;
        }

        let container = self.metadata.container(partition_id);
        let previous = container.rcu(|current| next_on_event(current, sequence, source_uuid).0);
        let (_, outcome) = next_on_event(&previous, sequence, source_uuid);

        match outcome {
            ApplyOutcome::Duplicate | ApplyOutcome::Ignored => return outcome,
            ApplyOutcome::OwnershipChanged => {
                info!(
                    "近端缓存 {} 分区 {} 所有者变更 ({:?} -> {})，清空该分区",
                    self.name, partition_id, previous.uuid, source_uuid
                );
                self.store.clear_partition(partition_id);
                GLOBAL_METRICS.record_repair(&self.name, "ownership_change");
            }
            ApplyOutcome::Gap { missed } => {
                debug!(
                    "近端缓存 {} 分区 {} 序列号缺口: {} -> {} (错过 {})",
                    self.name, partition_id, previous.sequence, sequence, missed
                );
                GLOBAL_METRICS.record_repair(&self.name, "gap");
                GLOBAL_METRICS.set_stale_partitions(&self.name, self.metadata.stale_partitions().len());
            }
            ApplyOutcome::Applied => {}
        }

        self.apply_target(partition_id, target);
        outcome
    }

    fn apply_target(&self, partition_id: i32, target: InvalidationTarget) {
        match target {
            InvalidationTarget::Key(key) => {
                self.store.invalidate(&key);
            }
            InvalidationTarget::Partition => {
                self.store.clear_partition(partition_id);
            }
            InvalidationTarget::All => {
                self.store.clear_all();
            }
        }
    }

    /// 按权威元数据对账
    ///
    /// # 参数
    ///
    /// * `metadata` - 从集群合并得到的权威元数据
    /// * `max_tolerated_stale_partitions` - 陈旧分区数超过该值时整体清空
    #[instrument(skip(self, metadata), level = "debug", fields(cache = %self.name))]
    pub fn reconcile(
        &self,
        metadata: &InvalidationMetadata,
        max_tolerated_stale_partitions: usize,
    ) -> ReconcileOutcome {
        let sequences = metadata.sequences_for(&self.name);
        let stale_count = self.metadata.stale_partitions().len();

        if stale_count > max_tolerated_stale_partitions {
            let cleared = self.store.clear_all();
            for (partition_id, sequence) in sequences {
                let uuid = metadata.partition_uuids.get(partition_id).copied();
                self.metadata.container(*partition_id).rcu(|current| PartitionMetaData {
                    sequence: *sequence,
                    uuid: uuid.or(current.uuid),
                    stale: false,
                    missed: current.missed,
                    baseline: if current.uuid.is_some() {
                        current.baseline
                    } else {
                        *sequence
                    },
                });
            }
            for entry in self.metadata.partitions.iter() {
                entry.value().rcu(|current| PartitionMetaData {
                    stale: false,
                    ..**current
                });
            }
            info!(
                "近端缓存 {} 陈旧分区过多 ({} > {})，整体清空 {} 条",
                self.name, stale_count, max_tolerated_stale_partitions, cleared
            );
            GLOBAL_METRICS.record_repair(&self.name, "full_clear");
            GLOBAL_METRICS.set_stale_partitions(&self.name, 0);
            return ReconcileOutcome {
                cleared_partitions: Vec::new(),
                full_clear: true,
            };
        }

        let mut outcome = ReconcileOutcome::default();
        for (partition_id, sequence) in sequences {
            let uuid = metadata.partition_uuids.get(partition_id).copied();
            let container = self.metadata.container(*partition_id);
            let previous = container.rcu(|current| next_on_reconcile(current, *sequence, uuid).0);
            let (_, action) = next_on_reconcile(&previous, *sequence, uuid);
            if action == ReconcileAction::Clear {
                self.store.clear_partition(*partition_id);
                outcome.cleared_partitions.push(*partition_id);
            }
        }

        if !outcome.cleared_partitions.is_empty() {
            debug!(
                "近端缓存 {} 对账清空分区: {:?}",
                self.name, outcome.cleared_partitions
            );
            GLOBAL_METRICS.record_repair(&self.name, "reconcile");
        }
        GLOBAL_METRICS.set_stale_partitions(&self.name, self.metadata.stale_partitions().len());
        outcome
    }
}
