//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了容量淘汰策略及其评估器。
//!
//! 评估器只比较两条记录的淘汰优先级；选择淘汰对象等价于按比较器取最小值。

use serde::Deserialize;
use std::cmp::Ordering;

/// 容量淘汰策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// 不按容量淘汰，只按过期和失效移除
    None,
    /// 最近最少使用
    #[default]
    Lru,
    /// 最不经常使用
    Lfu,
}

/// 参与淘汰比较的记录快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub creation_time: u64,
    pub last_access_time: u64,
    pub access_hit_count: u32,
}

/// 淘汰策略评估器
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicyEvaluator {
    policy: EvictionPolicy,
}

impl EvictionPolicyEvaluator {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn is_eviction_enabled(&self) -> bool {
        self.policy != EvictionPolicy::None
    }

    /// 比较两条记录
    ///
    /// 返回 `Ordering::Less` 表示 `a` 更应该被淘汰。
    /// LRU：较早的最后访问时间优先，相同时较早的创建时间优先；
    /// LFU：较少的命中次数优先，相同时较早的最后访问时间优先。
    pub fn compare(&self, a: &EvictionCandidate, b: &EvictionCandidate) -> Ordering {
        match self.policy {
            EvictionPolicy::None => Ordering::Equal,
            EvictionPolicy::Lru => a
                .last_access_time
                .cmp(&b.last_access_time)
                .then_with(|| a.creation_time.cmp(&b.creation_time)),
            EvictionPolicy::Lfu => a
                .access_hit_count
                .cmp(&b.access_hit_count)
                .then_with(|| a.last_access_time.cmp(&b.last_access_time)),
        }
    }

    /// `candidate` 是否比 `current` 更应该被淘汰
    pub fn is_better_victim(&self, candidate: &EvictionCandidate, current: &EvictionCandidate) -> bool {
        self.compare(candidate, current) == Ordering::Less
    }

    /// 从候选集合中选出淘汰对象
    ///
    /// 策略为 `None` 时不选择任何对象
    pub fn select_victim<T, I>(&self, candidates: I) -> Option<T>
    where
        I: IntoIterator<Item = (T, EvictionCandidate)>,
    {
        if !self.is_eviction_enabled() {
            return None;
        }
        let mut best: Option<(T, EvictionCandidate)> = None;
        for (item, candidate) in candidates {
            let replace = match &best {
                Some((_, current)) => self.is_better_victim(&candidate, current),
                None => true,
            };
            if replace {
                best = Some((item, candidate));
            }
        }
        best.map(|(item, _)| item)
    }
}
