//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内缓存的实现，每个租户一个独立的 Moka 缓存。
//!
//! 每个条目记录一个由注入时钟计算出的绝对过期时间，读取时据此判断是否过期，
//! 因此测试可以通过推进 `ManualClock` 得到确定的过期行为。
//! 只有时钟跟随真实时间时，才把条目 TTL 交给 Moka 的 `Expiry` 主动淘汰；
//! 手动时钟下过期只由注入时钟判定，并由 `purge_expired` 或清理任务回收。

use super::{resolve_ttl, CacheStore};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{Result, TriadError};
use crate::serialization::SerializerEnum;
use crate::tenant::TenantKey;
use crate::utils::is_blank;
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// 缓存条目：数据、原始 TTL 与绝对过期时间（毫秒）
#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    ttl: Option<Duration>,
    expires_at: Option<u64>,
}

impl Entry {
    #[inline]
    fn is_expired(&self, now_millis: u64) -> bool {
        matches!(self.expires_at, Some(at) if now_millis > at)
    }
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// 进程内缓存
pub struct MemoryCache {
    name: String,
    tenants: DashMap<TenantKey, Cache<String, Entry>>,
    max_capacity: u64,
    default_ttl: Option<Duration>,
    clock: SharedClock,
    serializer: SerializerEnum,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    /// 创建新的进程内缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `max_capacity` - 每个租户的最大条目数
    /// * `default_ttl` - 默认过期时间，`None` 表示不过期
    pub fn new(name: impl Into<String>, max_capacity: u64, default_ttl: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            tenants: DashMap::new(),
            max_capacity,
            default_ttl,
            clock: Arc::new(SystemClock),
            serializer: SerializerEnum::default(),
            janitor: Mutex::new(None),
        }
    }

    /// 使用指定的时钟
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// 使用指定的序列化器
    pub fn with_serializer(mut self, serializer: SerializerEnum) -> Self {
        self.serializer = serializer;
        self
    }

    fn build_namespace(&self) -> Cache<String, Entry> {
        let builder = Cache::builder()
            .max_capacity(self.max_capacity)
            .support_invalidation_closures();
        if self.clock.is_wall_clock() {
            builder.expire_after(EntryExpiry).build()
        } else {
            builder.build()
        }
    }

    /// 获取（必要时创建）租户命名空间；返回克隆以免跨 await 持有分片锁
    fn namespace(&self, tenant: &TenantKey) -> Cache<String, Entry> {
        if let Some(ns) = self.tenants.get(tenant) {
            return ns.clone();
        }
        self.tenants
            .entry(tenant.clone())
            .or_insert_with(|| self.build_namespace())
            .clone()
    }

    fn existing_namespace(&self, tenant: &TenantKey) -> Option<Cache<String, Entry>> {
        self.tenants.get(tenant).map(|ns| ns.clone())
    }

    fn make_entry(&self, value: Vec<u8>, ttl: Option<Duration>) -> Entry {
        let ttl = resolve_ttl(ttl, self.default_ttl);
        let expires_at = ttl.map(|d| self.clock.now_millis().saturating_add(d.as_millis() as u64));
        Entry {
            value,
            ttl,
            expires_at,
        }
    }

    async fn live_entry(&self, tenant: &TenantKey, key: &str) -> Option<Entry> {
        if is_blank(key) {
            return None;
        }
        let ns = self.existing_namespace(tenant)?;
        let entry = ns.get(key).await?;
        if entry.is_expired(self.clock.now_millis()) {
            debug!("Memory cache entry expired: tenant={}, key={}", tenant, key);
            ns.invalidate(key).await;
            return None;
        }
        Some(entry)
    }

    /// 已存在的租户命名空间
    pub fn tenants(&self) -> Vec<TenantKey> {
        self.tenants.iter().map(|e| e.key().clone()).collect()
    }

    /// 租户中未过期的条目数
    pub async fn entry_count(&self, tenant: &TenantKey) -> u64 {
        let Some(ns) = self.existing_namespace(tenant) else {
            return 0;
        };
        let now = self.clock.now_millis();
        ns.iter().filter(|(_, e)| !e.is_expired(now)).count() as u64
    }

    /// 主动删除按注入时钟已过期的条目
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub async fn purge_expired(&self) -> Result<()> {
        let now = self.clock.now_millis();
        let namespaces: Vec<Cache<String, Entry>> =
            self.tenants.iter().map(|e| e.value().clone()).collect();
        for ns in namespaces {
            ns.invalidate_entries_if(move |_, entry| entry.is_expired(now))
                .map_err(|e| TriadError::Cache(format!("{:?}", e)))?;
            ns.run_pending_tasks().await;
        }
        Ok(())
    }

    /// 启动后台清理任务，缓存被释放后任务自动退出
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = cache.purge_expired().await {
                    warn!("Memory cache purge failed: cache={}, error={}", cache.name, e);
                }
            }
        });
        if let Ok(mut slot) = self.janitor.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
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
        let entry = self.make_entry(value, ttl);
        self.namespace(tenant).insert(key.to_string(), entry).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get(&self, tenant: &TenantKey, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.live_entry(tenant, key).await.map(|e| e.value))
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn contains(&self, tenant: &TenantKey, key: &str) -> Result<bool> {
        Ok(self.live_entry(tenant, key).await.is_some())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn remove(&self, tenant: &TenantKey, key: &str) -> Result<()> {
        if is_blank(key) {
            return Ok(());
        }
        if let Some(ns) = self.existing_namespace(tenant) {
            ns.invalidate(key).await;
        }
        Ok(())
    }

    #[instrument(skip(self, entries), level = "debug", fields(cache = %self.name, entry_count = entries.len()))]
    async fn put_all(
        &self,
        tenant: &TenantKey,
        entries: Vec<(String, Option<Vec<u8>>)>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let ns = self.namespace(tenant);
        for (key, value) in entries {
            let Some(value) = value else {
                continue;
            };
            if is_blank(&key) {
                continue;
            }
            let entry = self.make_entry(value, None);
            ns.insert(key, entry).await;
        }
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn get_all(
        &self,
        tenant: &TenantKey,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::new();
        let Some(ns) = self.existing_namespace(tenant) else {
            return Ok(found);
        };
        let now = self.clock.now_millis();
        for key in keys {
            if is_blank(key) || found.contains_key(key) {
                continue;
            }
            if let Some(entry) = ns.get(key).await {
                if !entry.is_expired(now) {
                    found.insert(key.clone(), entry.value);
                }
            }
        }
        debug!("Memory cache get_all: requested={}, found={}", keys.len(), found.len());
        Ok(found)
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn remove_all(&self, tenant: &TenantKey, keys: &[String]) -> Result<()> {
        let Some(ns) = self.existing_namespace(tenant) else {
            return Ok(());
        };
        for key in keys.iter().filter(|k| !is_blank(k)) {
            ns.invalidate(key.as_str()).await;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn clear(&self, tenant: &TenantKey) -> Result<()> {
        if let Some((_, ns)) = self.tenants.remove(tenant) {
            ns.invalidate_all();
            debug!("Memory cache cleared tenant namespace: {}", tenant);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut slot) = self.janitor.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.tenants.clear();
        Ok(())
    }
}
