//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 Redis 的共享缓存实现。
//!
//! 键的格式为 `{prefix}:{tenant}:{key}`，过期由 Redis 服务端负责。

use super::{resolve_ttl, CacheStore};
use crate::config::RedisConfig;
use crate::error::{Result, TriadError};
use crate::serialization::SerializerEnum;
use crate::tenant::TenantKey;
use crate::utils::is_blank;
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// Redis 缓存
#[derive(Clone)]
pub struct RedisCache {
    name: String,
    manager: ConnectionManager,
    key_prefix: String,
    default_ttl: Option<Duration>,
    serializer: SerializerEnum,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("name", &self.name)
            .field("key_prefix", &self.key_prefix)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl RedisCache {
    /// 连接 Redis 并创建缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `config` - Redis 配置
    /// * `default_ttl` - 默认过期时间，`None` 表示不过期
    #[instrument(skip(config), level = "info", name = "init_redis_cache")]
    pub async fn connect(
        name: &str,
        config: &RedisConfig,
        default_ttl: Option<Duration>,
    ) -> Result<Self> {
        let connection_string = config.connection_string.expose_secret();
        let client = Client::open(connection_string)?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(TriadError::Cache(format!(
                    "Connection timed out after {}ms. Target: {}",
                    config.connection_timeout_ms,
                    redact_connection_string(connection_string)
                )));
            }
        };
        info!(
            "Redis cache '{}' connected to {}",
            name,
            redact_connection_string(connection_string)
        );
        Ok(Self {
            name: name.to_string(),
            manager,
            key_prefix: config.key_prefix.clone(),
            default_ttl,
            serializer: SerializerEnum::default(),
        })
    }

    #[inline]
    fn full_key(&self, tenant: &TenantKey, key: &str) -> String {
        tenant.namespaced(&self.key_prefix, key)
    }

    fn ttl_millis(&self, ttl: Option<Duration>) -> Option<u64> {
        resolve_ttl(ttl, self.default_ttl).map(|d| (d.as_millis() as u64).max(1))
    }

    fn set_cmd(&self, full_key: &str, value: &[u8], ttl: Option<Duration>) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(full_key).arg(value);
        if let Some(ms) = self.ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        cmd
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name, value_len = value.len()))]
    async fn put(
        &self,
        tenant: &TenantKey,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if is_blank(key) {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        self.set_cmd(&self.full_key(tenant, key), &value, ttl)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get(&self, tenant: &TenantKey, key: &str) -> Result<Option<Vec<u8>>> {
        if is_blank(key) {
            return Ok(None);
        }
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.full_key(tenant, key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn contains(&self, tenant: &TenantKey, key: &str) -> Result<bool> {
        if is_blank(key) {
            return Ok(false);
        }
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.full_key(tenant, key))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn remove(&self, tenant: &TenantKey, key: &str) -> Result<()> {
        if is_blank(key) {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(self.full_key(tenant, key))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, entries), level = "debug", fields(cache = %self.name, entry_count = entries.len()))]
    async fn put_all(
        &self,
        tenant: &TenantKey,
        entries: Vec<(String, Option<Vec<u8>>)>,
    ) -> Result<()> {
        let mut pipe = redis::pipe();
        let mut queued = 0usize;
        for (key, value) in entries {
            let Some(value) = value else {
                continue;
            };
            if is_blank(&key) {
                continue;
            }
            pipe.add_command(self.set_cmd(&self.full_key(tenant, &key), &value, None))
                .ignore();
            queued += 1;
        }
        if queued == 0 {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        pipe.query_async::<()>(&mut conn).await?;
        debug!("Redis put_all: wrote {} entries", queued);
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn get_all(
        &self,
        tenant: &TenantKey,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let wanted: Vec<&String> = keys.iter().filter(|k| !is_blank(k)).collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let mut cmd = redis::cmd("MGET");
        for key in &wanted {
            cmd.arg(self.full_key(tenant, key));
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<Vec<u8>>> = cmd.query_async(&mut conn).await?;
        Ok(wanted
            .into_iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k.clone(), v)))
            .collect())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn remove_all(&self, tenant: &TenantKey, keys: &[String]) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        let mut any = false;
        for key in keys.iter().filter(|k| !is_blank(k)) {
            cmd.arg(self.full_key(tenant, key));
            any = true;
        }
        if !any {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn clear(&self, tenant: &TenantKey) -> Result<()> {
        let pattern = format!("{}*", tenant.namespace_prefix(&self.key_prefix));
        let mut conn = self.manager.clone();
        let mut cursor = 0u64;
        let mut removed = 0usize;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                removed += keys.len();
                redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<()>(&mut conn)
                    .await?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        debug!("Redis clear: tenant={}, removed={}", tenant, removed);
        Ok(())
    }
}
