//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的指标收集和监控功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储近端缓存的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "name:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 修复事件统计
    /// key: "name:event"
    pub repair_events: Arc<Mutex<HashMap<String, u64>>>,
    /// 每个近端缓存当前的过期分区数
    pub stale_partitions: Arc<Mutex<HashMap<String, usize>>>,
    /// 分区表刷新结果
    pub partition_refreshes: Arc<Mutex<HashMap<String, u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `name` - 近端缓存名称
    /// * `op` - 操作类型（get/put/reserve/publish/invalidate）
    /// * `result` - 操作结果（hit/miss/ok/rejected）
    pub fn record_request(&self, name: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "near_cache_request", cache = name, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", name, op, result);
        if let Ok(mut map) = self.requests_total.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 记录修复事件
    ///
    /// # 参数
    ///
    /// * `name` - 近端缓存名称
    /// * `event` - 事件类型（gap/ownership_change/reconcile/full_clear）
    pub fn record_repair(&self, name: &str, event: &str) {
        let key = format!("{}:{}", name, event);
        if let Ok(mut map) = self.repair_events.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 设置过期分区数
    pub fn set_stale_partitions(&self, name: &str, count: usize) {
        if let Ok(mut map) = self.stale_partitions.lock() {
            map.insert(name.to_string(), count);
        }
    }

    /// 记录分区表刷新结果
    pub fn record_partition_refresh(&self, result: &str) {
        if let Ok(mut map) = self.partition_refreshes.lock() {
            *map.entry(result.to_string()).or_insert(0) += 1;
        }
    }

    /// 读取某个请求计数，主要用于测试
    pub fn request_count(&self, name: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", name, op, result);
        self.requests_total
            .lock()
            .ok()
            .and_then(|map| map.get(&key).copied())
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为字符串返回，用于监控系统采集
///
/// # 返回值
///
/// 返回包含所有指标的字符串
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    if let Ok(reqs) = metrics.requests_total.lock() {
        for (k, v) in reqs.iter() {
            let parts: Vec<&str> = k.rsplitn(3, ':').collect();
            if parts.len() == 3 {
                output.push_str(&format!(
                    "near_cache_requests_total{{name=\"{}\", op=\"{}\", result=\"{}\"}} {}\n",
                    parts[2], parts[1], parts[0], v
                ));
            }
        }
    }
    if let Ok(repairs) = metrics.repair_events.lock() {
        for (k, v) in repairs.iter() {
            if let Some((name, event)) = k.rsplit_once(':') {
                output.push_str(&format!(
                    "near_cache_repair_events_total{{name=\"{}\", event=\"{}\"}} {}\n",
                    name, event, v
                ));
            }
        }
    }
    if let Ok(stale) = metrics.stale_partitions.lock() {
        for (k, v) in stale.iter() {
            output.push_str(&format!(
                "near_cache_stale_partitions{{name=\"{}\"}} {}\n",
                k, v
            ));
        }
    }
    if let Ok(refreshes) = metrics.partition_refreshes.lock() {
        for (k, v) in refreshes.iter() {
            output.push_str(&format!(
                "partition_table_refreshes_total{{result=\"{}\"}} {}\n",
                k, v
            ));
        }
    }
    output
}
