//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 指标收集集成测试

use oxnear::config::Config;
use oxnear::invalidation::InvalidationTarget;
use oxnear::metrics::{get_metrics_string, GLOBAL_METRICS};
use oxnear::NearCacheManager;
use serial_test::serial;
use uuid::Uuid;

#[path = "../common/mod.rs"]
mod common;

#[test]
#[serial]
fn test_metrics_recording() {
    GLOBAL_METRICS.record_request("test_cache", "get", "hit");
    GLOBAL_METRICS.record_repair("test_cache", "full_clear");
    GLOBAL_METRICS.set_stale_partitions("test_cache", 3);
    GLOBAL_METRICS.record_partition_refresh("success");

    let output = get_metrics_string();

    println!("Metrics output:\n{}", output);

    assert!(output.contains(
        "near_cache_requests_total{name=\"test_cache\", op=\"get\", result=\"hit\"}"
    ));
    assert!(output.contains(
        "near_cache_repair_events_total{name=\"test_cache\", event=\"full_clear\"}"
    ));
    assert!(output.contains("near_cache_stale_partitions{name=\"test_cache\"} 3"));
    assert!(output.contains("partition_table_refreshes_total{result=\"success\"}"));
}

#[tokio::test]
#[serial]
async fn test_near_cache_operations_are_counted() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let manager = NearCacheManager::new(Config::default(), cluster.clone(), cluster.clone()).unwrap();
    let name = common::generate_unique_name("counted");
    let cache = manager.get_or_create(&name).unwrap();

    assert_eq!(cache.get::<_, u32>("k").unwrap(), None);
    assert!(cache.put("k", &5u32).await.unwrap());
    assert_eq!(cache.get::<_, u32>("k").unwrap(), Some(5));
    assert_eq!(cache.get::<_, u32>("k").unwrap(), Some(5));

    assert_eq!(GLOBAL_METRICS.request_count(&name, "get", "miss"), 1);
    assert_eq!(GLOBAL_METRICS.request_count(&name, "get", "hit"), 2);
    assert_eq!(GLOBAL_METRICS.request_count(&name, "put", "ok"), 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.owned_entry_count, 1);

    let handler = manager.repairing_task().handler(&name).unwrap();
    let owner = Uuid::new_v4();
    handler.apply(1, 1, owner, InvalidationTarget::All);
    handler.apply(1, 4, owner, InvalidationTarget::All);
    assert!(get_metrics_string().contains(&format!(
        "near_cache_repair_events_total{{name=\"{}\", event=\"gap\"}} 1",
        name
    )));

    manager.shutdown().await;
}
