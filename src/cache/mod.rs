//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 按租户隔离的缓存契约及其实现。
//!
//! 所有操作都显式携带租户键；不同租户的同名键互不可见。
//! 条目可以带有独立的 TTL，未指定时使用缓存的默认 TTL。
//! 过期条目惰性失效：读取过期条目等同于不存在。

pub mod memory;
pub mod redis_cache;

use crate::error::Result;
use crate::serialization::{Serializer, SerializerEnum};
use crate::tenant::TenantKey;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// 解析条目的有效 TTL
///
/// `None` 或零时长回退到默认 TTL；默认 TTL 为 `None` 表示不过期。
pub fn resolve_ttl(ttl: Option<Duration>, default_ttl: Option<Duration>) -> Option<Duration> {
    match ttl {
        Some(d) if !d.is_zero() => Some(d),
        _ => default_ttl,
    }
}

/// 缓存操作特征
///
/// 值以字节形式保存，类型化访问见 [`CacheExt`]。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 缓存名称
    fn name(&self) -> &str;

    /// 默认 TTL，`None` 表示不过期
    fn default_ttl(&self) -> Option<Duration>;

    /// 获取序列化器
    fn serializer(&self) -> &SerializerEnum;

    /// 写入缓存值
    ///
    /// # 参数
    ///
    /// * `tenant` - 租户
    /// * `key` - 缓存键，空白键不做任何操作
    /// * `value` - 缓存值
    /// * `ttl` - 过期时间，`None` 或零使用默认值
    async fn put(
        &self,
        tenant: &TenantKey,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// 获取缓存值，空白、不存在或已过期时返回 `None`
    async fn get(&self, tenant: &TenantKey, key: &str) -> Result<Option<Vec<u8>>>;

    /// 是否包含未过期的条目
    async fn contains(&self, tenant: &TenantKey, key: &str) -> Result<bool>;

    /// 删除缓存项（幂等）
    async fn remove(&self, tenant: &TenantKey, key: &str) -> Result<()>;

    /// 批量写入，全部使用默认 TTL
    ///
    /// 空白键或值为 `None` 的条目被跳过；重复键以后出现的为准。
    async fn put_all(&self, tenant: &TenantKey, entries: Vec<(String, Option<Vec<u8>>)>)
        -> Result<()>;

    /// 批量读取，只返回存在且未过期的键
    async fn get_all(&self, tenant: &TenantKey, keys: &[String])
        -> Result<HashMap<String, Vec<u8>>>;

    /// 批量删除
    async fn remove_all(&self, tenant: &TenantKey, keys: &[String]) -> Result<()>;

    /// 清空整个租户命名空间
    async fn clear(&self, tenant: &TenantKey) -> Result<()>;

    /// 释放资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// 缓存扩展特征
///
/// 提供类型安全的缓存操作接口
#[async_trait]
pub trait CacheExt: CacheStore {
    /// 获取缓存值（反序列化）
    #[instrument(skip(self), level = "debug")]
    async fn get_value<T: DeserializeOwned + Send>(
        &self,
        tenant: &TenantKey,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(tenant, key).await? {
            Some(data) => Ok(Some(self.serializer().deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// 设置缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn put_value<T: Serialize + Send + Sync>(
        &self,
        tenant: &TenantKey,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = self.serializer().serialize(value)?;
        self.put(tenant, key, bytes, ttl).await
    }

    /// 批量读取（反序列化）
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn get_all_values<T: DeserializeOwned + Send>(
        &self,
        tenant: &TenantKey,
        keys: &[String],
    ) -> Result<HashMap<String, T>> {
        let raw = self.get_all(tenant, keys).await?;
        let mut values = HashMap::with_capacity(raw.len());
        for (key, bytes) in raw {
            values.insert(key, self.serializer().deserialize(&bytes)?);
        }
        Ok(values)
    }

    /// 批量写入（序列化），值为 `None` 的条目被跳过
    #[instrument(skip(self, entries), level = "debug")]
    async fn put_all_values<T: Serialize + Send + Sync>(
        &self,
        tenant: &TenantKey,
        entries: Vec<(String, Option<T>)>,
    ) -> Result<()> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let bytes = match value {
                Some(v) => Some(self.serializer().serialize(&v)?),
                None => None,
            };
            encoded.push((key, bytes));
        }
        self.put_all(tenant, encoded).await
    }

    /// 在默认租户中读取
    async fn get_default(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get(&TenantKey::default(), key).await
    }

    /// 在默认租户中写入
    async fn put_default(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.put(&TenantKey::default(), key, value, ttl).await
    }
}

impl<T: CacheStore + ?Sized> CacheExt for T {}
