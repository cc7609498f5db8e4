//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 生命周期管理集成测试

use oxnear::config::{Config, NearCacheConfig};
use oxnear::lifecycle::TaskState;
use oxnear::{NearCacheError, NearCacheManager};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

#[tokio::test]
async fn test_manager_start_and_shutdown() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let manager = NearCacheManager::new(Config::default(), cluster.clone(), cluster.clone()).unwrap();
    assert_eq!(manager.router().state(), TaskState::NotStarted);

    manager.start().await.unwrap();
    assert_eq!(manager.router().state(), TaskState::Running);
    assert_eq!(manager.repairing_task().state(), TaskState::Running);
    assert_eq!(manager.expiration_state(), TaskState::Running);

    let cache = manager.get_or_create("orders").unwrap();
    assert!(cache.put("k", &"v").await.unwrap());

    tokio::time::timeout(Duration::from_secs(2), manager.shutdown())
        .await
        .expect("shutdown should complete promptly");
    assert_eq!(manager.router().state(), TaskState::Stopped);
    assert_eq!(manager.repairing_task().state(), TaskState::Stopped);
    assert_eq!(manager.expiration_state(), TaskState::Stopped);
    assert!(manager.list().is_empty());
    assert_eq!(cache.size(), 0);

    // 重复关闭是安全的
    manager.shutdown().await;
    assert!(manager.start().await.is_err());
}

#[tokio::test]
async fn test_concurrent_shutdown_calls() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let manager = NearCacheManager::new(Config::default(), cluster.clone(), cluster.clone()).unwrap();
    manager.start().await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.shutdown().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(manager.router().state(), TaskState::Stopped);
}

#[tokio::test]
async fn test_get_or_create_uses_matching_config() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let mut config = Config::default();
    config.near_caches.insert(
        "orders-*".to_string(),
        NearCacheConfig {
            max_entry_count: 5,
            invalidate_on_change: false,
            ..Default::default()
        },
    );
    let manager = NearCacheManager::new(config, cluster.clone(), cluster.clone()).unwrap();

    let orders = manager.get_or_create("orders-eu").unwrap();
    assert_eq!(orders.config().max_entry_count, 5);
    assert!(Arc::ptr_eq(&orders, &manager.get_or_create("orders-eu").unwrap()));
    assert!(manager.repairing_task().handler("orders-eu").is_none());

    let users = manager.get_or_create("users").unwrap();
    assert_eq!(users.config().max_entry_count, 10_000);
    assert!(manager.repairing_task().handler("users").is_some());

    assert_eq!(manager.list(), vec!["orders-eu".to_string(), "users".to_string()]);
}

#[tokio::test]
async fn test_destroy_deregisters_handler() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let manager = NearCacheManager::new(Config::default(), cluster.clone(), cluster.clone()).unwrap();
    let cache = manager.get_or_create("sessions").unwrap();
    assert!(cache.put("s1", &1u8).await.unwrap());
    assert_eq!(manager.repairing_task().handler_count(), 1);

    assert!(manager.destroy("sessions"));
    assert_eq!(manager.repairing_task().handler_count(), 0);
    assert!(manager.get("sessions").is_none());
    assert_eq!(cache.size(), 0);
    assert!(!manager.destroy("sessions"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    common::setup_logging();

    let cluster = common::FakeCluster::new(271);
    let mut config = Config::default();
    config.near_caches.insert(
        "bad".to_string(),
        NearCacheConfig {
            max_entry_count: -5,
            ..Default::default()
        },
    );

    let result = NearCacheManager::new(config, cluster.clone(), cluster.clone());
    assert!(matches!(result, Err(NearCacheError::ConfigError(_))));
}
