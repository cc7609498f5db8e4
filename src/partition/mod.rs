//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区路由：固定哈希函数、分区表快照和定期刷新。

pub mod murmur;
pub mod router;
pub mod table;

pub use murmur::{hash_to_index, murmur3_hash, DEFAULT_MURMUR_SEED};
pub use router::PartitionRouter;
pub use table::PartitionTable;
