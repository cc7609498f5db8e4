//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分区哈希函数：MurmurHash3 x86_32 与哈希到下标的映射。

use crate::error::Result;
use murmur3::murmur3_32;

/// 分区哈希使用的固定种子，集群成员使用同一种子
pub const DEFAULT_MURMUR_SEED: u32 = 0x0100_0193;

/// 以默认种子计算有符号的32位 MurmurHash3
pub fn murmur3_hash(bytes: &[u8]) -> Result<i32> {
    murmur3_hash_with_seed(bytes, DEFAULT_MURMUR_SEED)
}

pub fn murmur3_hash_with_seed(mut bytes: &[u8], seed: u32) -> Result<i32> {
    let hash = murmur3_32(&mut bytes, seed)?;
    Ok(hash as i32)
}

/// 将哈希值映射到 `[0, length)`
///
/// 负数取绝对值后取模；`i32::MIN` 没有对应的正数，固定映射到 0。
/// `length <= 0` 时返回 0。
pub fn hash_to_index(hash: i32, length: i32) -> i32 {
    if length <= 0 || hash == i32::MIN {
        return 0;
    }
    hash.abs() % length
}
