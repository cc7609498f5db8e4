//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分区路由集成测试

use oxnear::cluster::{Address, Member};
use oxnear::config::PartitionConfig;
use oxnear::lifecycle::TaskState;
use oxnear::partition::hash_to_index;
use oxnear::serialization::{JsonSerializer, Serializer, SerializerEnum};
use oxnear::PartitionRouter;
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

#[tokio::test]
async fn test_partition_id_is_deterministic() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let router = common::create_router(&cluster);

    let first = router.partition_id_for_key("testingKey").await.unwrap().unwrap();
    for _ in 0..50 {
        assert_eq!(
            router.partition_id_for_key("testingKey").await.unwrap(),
            Some(first)
        );
    }

    let data = JsonSerializer::new().to_data("testingKey").unwrap();
    assert_eq!(first, hash_to_index(data.partition_hash().unwrap(), 271));
    assert!((0..271).contains(&first));

    // 另一个路由实例得到同样的结果
    let other = common::create_router(&common::FakeCluster::new(271));
    assert_eq!(
        other.partition_id_for_key("testingKey").await.unwrap(),
        Some(first)
    );
}

#[tokio::test]
async fn test_first_fetch_retries_until_success() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    cluster.fail_next_partition_calls(3);
    let router = common::create_router(&cluster);

    assert_eq!(router.partition_count().await, Some(271));
    assert_eq!(cluster.partition_calls(), 4);
}

#[tokio::test]
async fn test_unreachable_cluster_reports_unknown() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    cluster.set_alive(false);
    let router = common::create_router(&cluster);

    assert_eq!(router.partition_count().await, None);
    assert_eq!(router.partition_id_for_key("k").await.unwrap(), None);
    assert_eq!(router.owner_of(0).await, None);
    assert_eq!(cluster.partition_calls(), 0);
}

#[tokio::test]
async fn test_lite_only_cluster_is_not_retried() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    cluster.set_members(vec![
        Member::new(Address::new("127.0.0.1", 5701), true),
        Member::new(Address::new("127.0.0.1", 5702), true),
    ]);
    let router = common::create_router(&cluster);

    let result = tokio::time::timeout(Duration::from_secs(1), router.partition_count()).await;
    assert_eq!(result.unwrap(), None);
    assert_eq!(router.partition_count().await, None);
    assert_eq!(cluster.partition_calls(), 0);
}

#[tokio::test]
async fn test_owner_lookup_and_refresh_replaces_snapshot() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let router = common::create_router(&cluster);

    assert_eq!(
        router.owner_of(17).await,
        Some(Address::new("127.0.0.1", 5701))
    );
    let before = router.snapshot();

    cluster.set_partition_count(7);
    assert!(router.do_refresh().await);
    assert_eq!(router.partition_count().await, Some(7));
    assert_eq!(router.owner_of(17).await, None);

    // 旧快照不受刷新影响
    assert_eq!(before.partition_count(), 271);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_table() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let router = common::create_router(&cluster);
    assert_eq!(router.partition_count().await, Some(271));

    cluster.set_failing(true);
    assert!(!router.do_refresh().await);
    assert_eq!(router.partition_count().await, Some(271));
}

#[tokio::test]
async fn test_refresh_loop_and_on_demand_refresh() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let router = Arc::new(PartitionRouter::new(
        PartitionConfig {
            refresh_interval_ms: 60_000,
            ..Default::default()
        },
        cluster.clone(),
        cluster.clone(),
        SerializerEnum::default(),
    ));

    router.start().await.unwrap();
    assert_eq!(router.state(), TaskState::Running);
    assert_eq!(cluster.partition_calls(), 1);

    cluster.set_partition_count(11);
    router.request_refresh();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.snapshot().partition_count(), 11);

    router.shutdown().await;
    assert_eq!(router.state(), TaskState::Stopped);
    router.shutdown().await;
}

#[tokio::test]
async fn test_zero_refresh_interval_is_rejected() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let router = Arc::new(PartitionRouter::new(
        PartitionConfig {
            refresh_interval_ms: 0,
            ..Default::default()
        },
        cluster.clone(),
        cluster.clone(),
        SerializerEnum::default(),
    ));

    assert!(router.start().await.is_err());
    assert_eq!(router.state(), TaskState::NotStarted);
    assert_eq!(cluster.partition_calls(), 0);
}
