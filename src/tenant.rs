//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 租户键：所有存储与缓存操作的隔离域。

use crate::error::{Result, TriadError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// 默认租户的固定命名空间
pub const DEFAULT_TENANT: &str = "default";

fn tenant_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$").expect("tenant pattern is valid")
    })
}

/// 租户键
///
/// 只能通过 [`TenantKey::new`] 或 [`TenantKey::default`] 构造，
/// 因此任何持有 `TenantKey` 的代码都已经过校验。克隆只增加引用计数。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(Arc<str>);

impl TenantKey {
    /// 创建租户键
    ///
    /// 首尾空白会被去除；空字符串或包含非法字符的标识会被拒绝。
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(TriadError::Validation("tenant id cannot be blank".to_string()));
        }
        if !tenant_pattern().is_match(id) {
            return Err(TriadError::Validation(format!("invalid tenant id '{}'", id)));
        }
        Ok(Self(Arc::from(id)))
    }

    /// 租户标识
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否为默认租户
    pub fn is_default(&self) -> bool {
        &*self.0 == DEFAULT_TENANT
    }

    /// 生成共享后端（如 Redis）中使用的带命名空间的键
    ///
    /// 格式: `{prefix}:{tenant}:{key}`
    pub fn namespaced(&self, prefix: &str, key: &str) -> String {
        format!("{}:{}:{}", prefix, self.0, key)
    }

    /// 当前租户在共享后端中的键前缀，格式: `{prefix}:{tenant}:`
    pub fn namespace_prefix(&self, prefix: &str) -> String {
        format!("{}:{}:", prefix, self.0)
    }
}

impl Default for TenantKey {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_TENANT))
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantKey({})", self.0)
    }
}

impl AsRef<str> for TenantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for TenantKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TenantKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TenantKey::new(raw).map_err(serde::de::Error::custom)
    }
}
