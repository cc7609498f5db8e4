//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的序列化机制：键总是以 `Data` 形式存储和路由，
//! 值在二进制内存格式下同样转换为 `Data`。

pub mod data;
pub mod json;

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use data::Data;
pub use json::JsonSerializer;

/// 序列化器特征
///
/// 定义对象与 `Data` 之间转换的接口
pub trait Serializer: Send + Sync {
    /// 序列化值为 `Data`
    fn to_data<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data>;

    /// 从 `Data` 反序列化值
    fn to_object<T: DeserializeOwned>(&self, data: &Data) -> Result<T>;
}

/// 序列化器枚举
///
/// 用于在不能使用泛型 trait object 的地方分发序列化器
#[derive(Clone, Debug)]
pub enum SerializerEnum {
    Json(JsonSerializer),
}

impl Default for SerializerEnum {
    fn default() -> Self {
        SerializerEnum::Json(JsonSerializer::new())
    }
}

impl Serializer for SerializerEnum {
    fn to_data<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data> {
        match self {
            SerializerEnum::Json(s) => s.to_data(value),
        }
    }

    fn to_object<T: DeserializeOwned>(&self, data: &Data) -> Result<T> {
        match self {
            SerializerEnum::Json(s) => s.to_object(data),
        }
    }
}
