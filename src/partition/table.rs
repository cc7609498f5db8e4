//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分区表快照。快照不可变，刷新时整体替换。

use crate::cluster::{Address, PartitionTableResponse};
use ahash::AHashMap;

/// 分区 -> 所有者地址 的不可变快照
#[derive(Debug, Default, Clone)]
pub struct PartitionTable {
    owners: AHashMap<i32, Address>,
    version: i32,
}

impl PartitionTable {
    pub fn from_response(response: PartitionTableResponse) -> Self {
        let mut owners = AHashMap::new();
        for (address, partitions) in response.owners {
            for partition_id in partitions {
                owners.insert(partition_id, address.clone());
            }
        }
        Self {
            owners,
            version: response.version,
        }
    }

    pub fn partition_count(&self) -> i32 {
        self.owners.len() as i32
    }

    pub fn owner_of(&self, partition_id: i32) -> Option<&Address> {
        self.owners.get(&partition_id)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
