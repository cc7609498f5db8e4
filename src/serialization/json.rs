//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::{Data, Serializer};
use crate::error::{NearCacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON负载的类型标识
pub const JSON_TYPE_ID: i32 = -130;

/// JSON序列化器
///
/// 实现基于serde_json的序列化和反序列化
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// 创建新的JSON序列化器
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    /// 序列化值为JSON负载的 `Data`
    ///
    /// # 参数
    ///
    /// * `value` - 要序列化的值
    ///
    /// # 返回值
    ///
    /// 返回序列化后的数据或错误
    fn to_data<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data> {
        let json_bytes =
            serde_json::to_vec(value).map_err(|e| NearCacheError::Serialization(e.to_string()))?;
        Ok(Data::new(JSON_TYPE_ID, &json_bytes))
    }

    /// 从JSON负载的 `Data` 反序列化值
    ///
    /// 类型标识不是JSON时返回错误
    fn to_object<T: DeserializeOwned>(&self, data: &Data) -> Result<T> {
        if data.type_id() != JSON_TYPE_ID {
            return Err(NearCacheError::Serialization(format!(
                "unexpected type id {}, expected JSON ({})",
                data.type_id(),
                JSON_TYPE_ID
            )));
        }
        serde_json::from_slice(data.payload())
            .map_err(|e| NearCacheError::Serialization(e.to_string()))
    }
}
