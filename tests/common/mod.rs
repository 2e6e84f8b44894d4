//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和测试替身。

#![allow(dead_code)]

use async_trait::async_trait;
use oxtriad::cache::CacheStore;
use oxtriad::serialization::SerializerEnum;
use oxtriad::store::Pager;
use oxtriad::{
    ManualClock, MemoryCache, MemoryIndex, MemoryStore, Orchestrator, PrimaryStore, Record,
    Result, SearchIndex, TenantKey, TriadError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 测试起始时间：2025-06-15T00:00:00Z
pub const START_MILLIS: u64 = 1_749_945_600_000;

pub fn setup_logging() {
    oxtriad::utils::setup_logging();
}

/// 生成唯一的租户，避免测试之间互相干扰
pub fn unique_tenant(prefix: &str) -> TenantKey {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    TenantKey::new(format!("{}-{}", prefix, &suffix[..12])).unwrap()
}

pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

pub async fn is_redis_available() -> bool {
    oxtriad::utils::is_redis_available_url(&redis_url()).await
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(START_MILLIS))
}

pub fn doc(id: &str) -> Record {
    Record::new("doc").with_id(id).with_name(format!("doc {}", id))
}

/// 记录调用次数的主存储
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub reads: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub read_all_batches: Mutex<Vec<Vec<String>>>,
    pub fail: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn read_all_batches(&self) -> Vec<Vec<String>> {
        self.read_all_batches.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(TriadError::Store("primary store unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PrimaryStore for CountingStore {
    async fn create(&self, tenant: &TenantKey, record: &Record) -> Result<Option<String>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.create(tenant, record).await
    }

    async fn read(&self, tenant: &TenantKey, id: &str) -> Result<Option<Record>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.read(tenant, id).await
    }

    async fn update(&self, tenant: &TenantKey, record: &Record) -> Result<bool> {
        self.check()?;
        self.inner.update(tenant, record).await
    }

    async fn delete(&self, tenant: &TenantKey, record: &Record) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.delete(tenant, record).await
    }

    async fn create_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        self.check()?;
        self.inner.create_all(tenant, records).await
    }

    async fn read_all(
        &self,
        tenant: &TenantKey,
        ids: &[String],
    ) -> Result<HashMap<String, Record>> {
        self.read_all_batches.lock().unwrap().push(ids.to_vec());
        self.check()?;
        self.inner.read_all(tenant, ids).await
    }

    async fn update_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        self.check()?;
        self.inner.update_all(tenant, records).await
    }

    async fn delete_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        self.check()?;
        self.inner.delete_all(tenant, records).await
    }

    async fn read_page(&self, tenant: &TenantKey, pager: &mut Pager) -> Result<Vec<Record>> {
        self.check()?;
        self.inner.read_page(tenant, pager).await
    }
}

/// 记录调用的搜索索引，可注入失败或延迟
#[derive(Default)]
pub struct RecordingIndex {
    pub inner: MemoryIndex,
    pub unindexed: Mutex<Vec<String>>,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl RecordingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let index = Self::default();
        index.fail.store(true, Ordering::SeqCst);
        index
    }

    pub fn slow(delay: Duration) -> Self {
        let index = Self::default();
        *index.delay.lock().unwrap() = Some(delay);
        index
    }

    pub fn unindexed(&self) -> Vec<String> {
        self.unindexed.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    async fn before_call(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TriadError::Index("index cluster unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    async fn index(&self, tenant: &TenantKey, record: &Record) -> Result<()> {
        self.before_call().await?;
        self.inner.index(tenant, record).await
    }

    async fn unindex(&self, tenant: &TenantKey, record: &Record) -> Result<()> {
        self.unindexed.lock().unwrap().push(record.id.clone());
        self.before_call().await?;
        self.inner.unindex(tenant, record).await
    }

    async fn index_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.id.clone()).collect());
        self.before_call().await?;
        self.inner.index_all(tenant, records).await
    }

    async fn unindex_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        self.before_call().await?;
        self.inner.unindex_all(tenant, records).await
    }
}

/// 所有操作都失败的缓存
pub struct FailingCache {
    serializer: SerializerEnum,
}

impl FailingCache {
    pub fn new() -> Self {
        Self {
            serializer: SerializerEnum::default(),
        }
    }

    fn err<T>() -> Result<T> {
        Err(TriadError::Cache("cache node down".into()))
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    fn default_ttl(&self) -> Option<Duration> {
        None
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    async fn put(&self, _: &TenantKey, _: &str, _: Vec<u8>, _: Option<Duration>) -> Result<()> {
        Self::err()
    }

    async fn get(&self, _: &TenantKey, _: &str) -> Result<Option<Vec<u8>>> {
        Self::err()
    }

    async fn contains(&self, _: &TenantKey, _: &str) -> Result<bool> {
        Self::err()
    }

    async fn remove(&self, _: &TenantKey, _: &str) -> Result<()> {
        Self::err()
    }

    async fn put_all(&self, _: &TenantKey, _: Vec<(String, Option<Vec<u8>>)>) -> Result<()> {
        Self::err()
    }

    async fn get_all(&self, _: &TenantKey, _: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        Self::err()
    }

    async fn remove_all(&self, _: &TenantKey, _: &[String]) -> Result<()> {
        Self::err()
    }

    async fn clear(&self, _: &TenantKey) -> Result<()> {
        Self::err()
    }
}

/// 写入前先等待一段时间的内存缓存
pub struct SlowCache {
    pub inner: MemoryCache,
    delay: Duration,
}

impl SlowCache {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryCache::new("slow", 10_000, None),
            delay,
        }
    }
}

#[async_trait]
impl CacheStore for SlowCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.inner.default_ttl()
    }

    fn serializer(&self) -> &SerializerEnum {
        self.inner.serializer()
    }

    async fn put(
        &self,
        tenant: &TenantKey,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(tenant, key, value, ttl).await
    }

    async fn get(&self, tenant: &TenantKey, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(tenant, key).await
    }

    async fn contains(&self, tenant: &TenantKey, key: &str) -> Result<bool> {
        self.inner.contains(tenant, key).await
    }

    async fn remove(&self, tenant: &TenantKey, key: &str) -> Result<()> {
        self.inner.remove(tenant, key).await
    }

    async fn put_all(&self, tenant: &TenantKey, entries: Vec<(String, Option<Vec<u8>>)>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_all(tenant, entries).await
    }

    async fn get_all(&self, tenant: &TenantKey, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.inner.get_all(tenant, keys).await
    }

    async fn remove_all(&self, tenant: &TenantKey, keys: &[String]) -> Result<()> {
        self.inner.remove_all(tenant, keys).await
    }

    async fn clear(&self, tenant: &TenantKey) -> Result<()> {
        self.inner.clear(tenant).await
    }
}

/// 测试环境：计数存储 + 记录索引 + 手动时钟驱动的内存缓存
pub struct Harness {
    pub store: Arc<CountingStore>,
    pub index: Arc<RecordingIndex>,
    pub cache: Arc<MemoryCache>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_index(RecordingIndex::new())
    }

    pub fn with_index(index: RecordingIndex) -> Self {
        setup_logging();
        let clock = manual_clock();
        let store = Arc::new(CountingStore::new());
        let index = Arc::new(index);
        let cache = Arc::new(
            MemoryCache::new("records", 10_000, Some(Duration::from_secs(600)))
                .with_clock(clock.clone()),
        );
        let orchestrator = Orchestrator::builder()
            .store(store.clone())
            .index(index.clone())
            .cache(cache.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        Self {
            store,
            index,
            cache,
            clock,
            orchestrator,
        }
    }
}
