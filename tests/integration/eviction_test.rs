//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 容量淘汰集成测试

use oxnear::config::NearCacheConfig;
use oxnear::nearcache::{CachedValue, NearCacheStore};
use oxnear::serialization::{Data, JsonSerializer, Serializer};
use oxnear::EvictionPolicy;
use rand::Rng;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

fn key(name: &str) -> Data {
    JsonSerializer::new().to_data(name).unwrap()
}

fn value(v: u32) -> CachedValue {
    CachedValue::Binary(JsonSerializer::new().to_data(&v).unwrap())
}

fn create_store(policy: EvictionPolicy, max_entry_count: i32) -> NearCacheStore {
    NearCacheStore::new(
        common::generate_unique_name("eviction"),
        NearCacheConfig {
            eviction_policy: policy,
            max_entry_count,
            ..Default::default()
        },
    )
    .unwrap()
}

async fn tick() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

#[tokio::test]
async fn test_lru_evicts_least_recently_read() {
    common::setup_logging();

    let store = create_store(EvictionPolicy::Lru, 2);
    store.put(key("A"), value(1), 0);
    tick().await;
    store.put(key("B"), value(2), 0);
    tick().await;
    assert!(store.get(&key("A")).is_some());
    tick().await;
    store.put(key("C"), value(3), 0);

    assert_eq!(store.size(), 2);
    assert!(store.get(&key("B")).is_none());
    assert!(store.get(&key("A")).is_some());
    assert!(store.get(&key("C")).is_some());
    assert_eq!(store.stats().evictions, 1);
}

#[tokio::test]
async fn test_lru_victim_is_smallest_last_access() {
    common::setup_logging();

    let store = create_store(EvictionPolicy::Lru, 4);
    for name in ["k0", "k1", "k2", "k3"] {
        store.put(key(name), value(0), 0);
        tick().await;
    }
    // 访问顺序 k2, k0, k3, k1 之后 k2 最久未访问
    for name in ["k2", "k0", "k3", "k1"] {
        assert!(store.get(&key(name)).is_some());
        tick().await;
    }

    store.put(key("k4"), value(0), 0);
    assert!(store.get(&key("k2")).is_none());
    assert_eq!(store.size(), 4);
}

#[tokio::test]
async fn test_lfu_evicts_least_frequently_read() {
    common::setup_logging();

    let store = create_store(EvictionPolicy::Lfu, 3);
    store.put(key("x"), value(0), 0);
    store.put(key("y"), value(0), 0);
    store.put(key("z"), value(0), 0);
    for _ in 0..3 {
        store.get(&key("x"));
        store.get(&key("z"));
    }
    store.get(&key("y"));

    store.put(key("w"), value(0), 0);
    assert!(store.get(&key("y")).is_none());
    assert!(store.get(&key("x")).is_some());
}

#[tokio::test]
async fn test_size_bound_holds_for_random_workload() {
    common::setup_logging();

    let max_entry_count = 16;
    for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu] {
        let store = create_store(policy, max_entry_count);
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let k = format!("key-{}", rng.gen_range(0..64));
            if rng.gen_bool(0.3) {
                store.get(&key(&k));
            } else {
                store.put(key(&k), value(rng.gen()), rng.gen_range(0..271));
                assert!(store.size() <= max_entry_count as usize);
            }
        }
    }
}

#[tokio::test]
async fn test_policy_none_and_unbounded() {
    common::setup_logging();

    let store = create_store(EvictionPolicy::None, 2);
    for i in 0..10 {
        store.put(key(&format!("n{}", i)), value(i), 0);
    }
    assert_eq!(store.size(), 10);
    assert_eq!(store.stats().evictions, 0);

    let unbounded = create_store(EvictionPolicy::Lru, 0);
    for i in 0..100 {
        unbounded.put(key(&format!("u{}", i)), value(i), 0);
    }
    assert_eq!(unbounded.size(), 100);
}
