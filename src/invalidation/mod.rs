//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效序列记账与反熵修复。

pub mod handler;
pub mod task;

pub use handler::{
    ApplyOutcome, InvalidationTarget, MetaDataTable, PartitionMetaData, ReconcileOutcome,
    RepairingHandler,
};
pub use task::{RepairTickReport, RepairingTask};
