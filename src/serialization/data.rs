//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 序列化数据的内存布局。
//!
//! 布局：`[0..4)` 大端分区哈希（0 表示未设置），`[4..8)` 类型标识，`[8..)` 负载。

use crate::error::{NearCacheError, Result};
use crate::partition::murmur::murmur3_hash;
use std::fmt;
use std::sync::Arc;

const PARTITION_HASH_OFFSET: usize = 0;
const TYPE_OFFSET: usize = 4;
/// 负载起始偏移
pub const DATA_OFFSET: usize = 8;

/// 序列化后的键或值
///
/// 克隆只增加引用计数；相等性和哈希基于完整字节。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Data {
    bytes: Arc<[u8]>,
}

impl Data {
    /// 由类型标识和负载构造，不携带显式分区哈希
    pub fn new(type_id: i32, payload: &[u8]) -> Self {
        Self::with_partition_hash(0, type_id, payload)
    }

    /// 构造携带显式分区哈希的数据（分区感知键）
    pub fn with_partition_hash(partition_hash: i32, type_id: i32, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(DATA_OFFSET + payload.len());
        bytes.extend_from_slice(&partition_hash.to_be_bytes());
        bytes.extend_from_slice(&type_id.to_be_bytes());
        bytes.extend_from_slice(payload);
        Self {
            bytes: bytes.into(),
        }
    }

    /// 从完整字节解析，长度不足头部时返回错误
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < DATA_OFFSET {
            return Err(NearCacheError::Serialization(format!(
                "data too short: {} bytes, header needs {}",
                bytes.len(),
                DATA_OFFSET
            )));
        }
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[DATA_OFFSET..]
    }

    pub fn type_id(&self) -> i32 {
        read_i32(&self.bytes, TYPE_OFFSET)
    }

    pub fn has_partition_hash(&self) -> bool {
        read_i32(&self.bytes, PARTITION_HASH_OFFSET) != 0
    }

    /// 分区哈希
    ///
    /// 显式设置时直接返回，否则对负载计算 MurmurHash3 x86_32
    pub fn partition_hash(&self) -> Result<i32> {
        if self.has_partition_hash() {
            return Ok(read_i32(&self.bytes, PARTITION_HASH_OFFSET));
        }
        murmur3_hash(self.payload())
    }

    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_be_bytes(buf)
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("type_id", &self.type_id())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}
