//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储、索引和缓存的基本单元：记录。

use crate::error::{Result, TriadError};
use crate::utils::is_blank;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_true() -> bool {
    true
}

fn is_valid_kind(kind: &str) -> bool {
    kind.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 记录
///
/// 在租户内由 `id` 唯一标识。`id` 一经分配不可修改；
/// 租户不保存在记录内部，由操作参数隐式给出。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 记录标识
    #[serde(default)]
    pub id: String,
    /// 类型判别符
    pub kind: String,
    /// 可选的显示名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 创建时间（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// 更新时间（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
    /// 为 false 时不写入搜索索引
    #[serde(default = "default_true")]
    pub indexed: bool,
    /// 为 false 时不写入缓存
    #[serde(default = "default_true")]
    pub cached: bool,
    /// 开放属性集
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Record {
    /// 创建指定类型、尚未分配 id 的记录
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            name: None,
            timestamp: None,
            updated: None,
            indexed: true,
            cached: true,
            properties: Map::new(),
        }
    }

    /// 指定 id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 指定名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 设置是否参与索引
    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    /// 设置是否参与缓存
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// 读取属性
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// 是否已分配 id
    pub fn has_id(&self) -> bool {
        !is_blank(&self.id)
    }

    /// 合法性校验
    pub fn validate(&self) -> Result<()> {
        if is_blank(&self.id) {
            return Err(TriadError::Validation("record id cannot be blank".to_string()));
        }
        if is_blank(&self.kind) {
            return Err(TriadError::Validation(format!(
                "record '{}' has a blank kind",
                self.id
            )));
        }
        if !is_valid_kind(&self.kind) {
            return Err(TriadError::Validation(format!(
                "record '{}' has an invalid kind '{}'",
                self.id, self.kind
            )));
        }
        if let (Some(created), Some(updated)) = (self.timestamp, self.updated) {
            if updated < created {
                return Err(TriadError::Validation(format!(
                    "record '{}' was updated ({}) before it was created ({})",
                    self.id, updated, created
                )));
            }
        }
        Ok(())
    }

    /// 是否合法
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
