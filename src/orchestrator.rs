//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了一致性编排器：包装主存储的每个操作，
//! 按照操作固定的索引意图与缓存意图把结果传播到搜索索引和缓存。
//!
//! 主存储的结果是调用方唯一能看到的结果。索引与缓存的传播失败
//! 只会被记录并计入指标，不会影响调用方的返回值。

use crate::cache::{CacheExt, CacheStore, MemoryCache};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{
    Config, PropagationMode, DEFAULT_MAX_CAPACITY, DEFAULT_RECORD_CACHE, DEFAULT_TTL_SECS,
};
use crate::error::{Result, TriadError};
use crate::id::IdGenerator;
use crate::index::SearchIndex;
use crate::intent::{CacheIntent, IndexIntent, IntentPair, Operation};
use crate::manager::Registry;
use crate::metrics::Metrics;
use crate::policy::SpecialObjectPolicy;
use crate::propagation::PropagationLanes;
use crate::record::Record;
use crate::serialization::Serializer;
use crate::store::{Pager, PrimaryStore};
use crate::tenant::TenantKey;
use crate::utils::is_blank;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const STORE: &str = "store";
const INDEX: &str = "index";
const CACHE: &str = "cache";

/// 编排器运行参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 是否启用缓存传播
    pub cache_enabled: bool,
    /// 是否启用索引传播
    pub index_enabled: bool,
    /// 传播方式
    pub propagation: PropagationMode,
    /// 单次传播的超时时间
    pub propagation_timeout: Duration,
    /// 记录缓存在注册表中的名称
    pub cache_name: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            index_enabled: true,
            propagation: PropagationMode::Inline,
            propagation_timeout: Duration::from_millis(5000),
            cache_name: DEFAULT_RECORD_CACHE.to_string(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_enabled: config.global.cache_enabled,
            index_enabled: config.global.index_enabled,
            propagation: config.global.propagation,
            propagation_timeout: Duration::from_millis(config.global.propagation_timeout_ms),
            cache_name: config.orchestrator.cache.clone(),
        }
    }
}

/// 一致性编排器
pub struct Orchestrator {
    store: Arc<dyn PrimaryStore>,
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    policy: SpecialObjectPolicy,
    ids: Arc<IdGenerator>,
    clock: SharedClock,
    settings: OrchestratorSettings,
    lanes: PropagationLanes,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", &self.cache.name())
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// 根据配置一次性组装编排器
    ///
    /// # 参数
    ///
    /// * `config` - 进程配置
    /// * `store` - 主存储适配器
    /// * `index` - 搜索索引适配器
    /// * `clock` - 时间源
    #[instrument(skip_all, level = "info")]
    pub async fn from_config(
        config: &Config,
        store: Arc<dyn PrimaryStore>,
        index: Arc<dyn SearchIndex>,
        clock: SharedClock,
    ) -> Result<Self> {
        let registry = Arc::new(Registry::from_config(config, clock.clone()).await?);
        let ids = Arc::new(IdGenerator::from_config(&config.global.id, clock.clone())?);
        Self::builder()
            .store(store)
            .index(index)
            .registry(registry)
            .policy(SpecialObjectPolicy::with_kinds(
                config.global.special_kinds.iter().cloned(),
            ))
            .id_generator(ids)
            .clock(clock)
            .settings(OrchestratorSettings::from_config(config))
            .build()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// 记录缓存
    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    pub fn policy(&self) -> &SpecialObjectPolicy {
        &self.policy
    }

    /// 等待已提交的后台传播全部结束
    ///
    /// 内联模式下没有排队的传播，立即返回。
    pub async fn wait_for_propagation(&self) {
        self.lanes.drain().await;
    }

    /// 操作在当前开关下生效的意图
    pub fn intents(&self, op: Operation) -> IntentPair {
        op.intents()
            .effective(self.settings.cache_enabled, self.settings.index_enabled)
    }

    /// 创建记录
    ///
    /// 空 id 由标识生成器分配，缺失的创建时间由时钟填充。
    /// 记录不合法时返回 `TriadError::Validation`，且不会调用存储。
    /// 存储返回 `None` 时不做任何传播。
    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, kind = %record.kind))]
    pub async fn create(&self, tenant: &TenantKey, mut record: Record) -> Result<Option<Record>> {
        let op = Operation::Create;
        let intents = self.intents(op);
        if !record.has_id() {
            record.id = self.ids.new_id();
        }
        if record.timestamp.is_none() {
            record.timestamp = Some(self.clock.now_millis());
        }
        if intents.index == IndexIntent::Add {
            self.validate(op, &record)?;
        }

        let Some(id) = self.call_store(op, self.store.create(tenant, &record)).await? else {
            debug!("Store created nothing for tenant {}", tenant);
            return Ok(None);
        };
        record.id = id;

        self.index_one(op, intents.index, tenant, &record).await;
        self.cache_one(op, intents.cache, tenant, &record).await;
        Ok(Some(record))
    }

    /// 读取记录（读穿缓存）
    ///
    /// 缓存命中时直接返回，不调用存储；未命中时读取存储并回填缓存。
    #[instrument(skip(self), level = "debug", fields(tenant = %tenant))]
    pub async fn read(&self, tenant: &TenantKey, id: &str) -> Result<Option<Record>> {
        let op = Operation::Read;
        if self.intents(op).cache != CacheIntent::Get {
            return self.call_store(op, self.store.read(tenant, id)).await;
        }
        if is_blank(id) {
            return Ok(None);
        }

        match self.cache.get_value::<Record>(tenant, id).await {
            Ok(Some(record)) => {
                debug!("Cache hit: tenant={}, id={}", tenant, id);
                self.metrics.record_request(CACHE, op.as_str(), "hit");
                return Ok(Some(record));
            }
            Ok(None) => {
                self.metrics.record_request(CACHE, op.as_str(), "miss");
            }
            Err(e) => {
                warn!("Cache read failed, falling back to store: tenant={}, id={}, error={}", tenant, id, e);
                self.metrics.record_request(CACHE, op.as_str(), "error");
            }
        }

        let record = self.call_store(op, self.store.read(tenant, id)).await?;
        if let Some(found) = &record {
            self.cache_one(op, CacheIntent::Put, tenant, found).await;
        }
        Ok(record)
    }

    /// 更新记录并刷新缓存与索引
    ///
    /// 更新时间由时钟填充。存储返回 `false` 时仍按意图传播。
    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, id = %record.id))]
    pub async fn update(&self, tenant: &TenantKey, mut record: Record) -> Result<bool> {
        let op = Operation::Update;
        let intents = self.intents(op);
        record.updated = Some(self.clock.now_millis());
        if intents.index == IndexIntent::Add {
            self.validate(op, &record)?;
        }

        let updated = self.call_store(op, self.store.update(tenant, &record)).await?;
        self.index_one(op, intents.index, tenant, &record).await;
        self.cache_one(op, intents.cache, tenant, &record).await;
        Ok(updated)
    }

    /// 删除记录
    ///
    /// 无论存储调用是否成功，都会从索引中移除该记录；
    /// 只有存储调用成功时才会从缓存中删除。
    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, id = %record.id))]
    pub async fn delete(&self, tenant: &TenantKey, record: &Record) -> Result<bool> {
        let op = Operation::Delete;
        let intents = self.intents(op);
        let outcome = self.call_store(op, self.store.delete(tenant, record)).await;
        self.index_one(op, intents.index, tenant, record).await;
        let deleted = outcome?;
        self.cache_one(op, intents.cache, tenant, record).await;
        Ok(deleted)
    }

    /// 批量创建
    ///
    /// 所有记录都交给存储；特殊类型、不合法或显式退出的记录不会传播。
    #[instrument(skip(self, records), level = "debug", fields(tenant = %tenant, count = records.len()))]
    pub async fn create_all(&self, tenant: &TenantKey, mut records: Vec<Record>) -> Result<Vec<Record>> {
        let op = Operation::CreateAll;
        let intents = self.intents(op);
        let now = self.clock.now_millis();
        for record in records.iter_mut() {
            if !record.has_id() {
                record.id = self.ids.new_id();
            }
            if record.timestamp.is_none() {
                record.timestamp = Some(now);
            }
        }

        self.call_store(op, self.store.create_all(tenant, &records)).await?;
        self.index_batch(op, intents.index, tenant, &records).await;
        self.cache_batch(op, intents.cache, tenant, &records).await;
        Ok(records)
    }

    /// 批量读取
    ///
    /// 只要有一个 id 不在缓存中，就对整批 id 调用一次存储，
    /// 用存储结果整体回填缓存并返回存储结果。
    #[instrument(skip(self, ids), level = "debug", fields(tenant = %tenant, count = ids.len()))]
    pub async fn read_all(&self, tenant: &TenantKey, ids: &[String]) -> Result<HashMap<String, Record>> {
        let op = Operation::ReadAll;
        if self.intents(op).cache != CacheIntent::GetAll {
            return self.call_store(op, self.store.read_all(tenant, ids)).await;
        }
        let wanted: Vec<String> = ids.iter().filter(|id| !is_blank(id)).cloned().collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let cached = self.cached_records(op, tenant, &wanted).await;
        if wanted.iter().all(|id| cached.contains_key(id)) {
            debug!("Batch cache hit: tenant={}, count={}", tenant, cached.len());
            self.metrics.record_request(CACHE, op.as_str(), "hit");
            return Ok(cached);
        }
        debug!(
            "Batch cache miss, refetching whole batch: requested={}, cached={}",
            wanted.len(),
            cached.len()
        );
        self.metrics.record_request(CACHE, op.as_str(), "miss");

        let fresh = self.call_store(op, self.store.read_all(tenant, &wanted)).await?;
        let entries: Vec<(String, Option<Record>)> = fresh
            .iter()
            .filter(|(_, r)| r.cached)
            .map(|(id, r)| (id.clone(), Some(r.clone())))
            .collect();
        self.cache_entries(op, tenant, entries).await;
        Ok(fresh)
    }

    /// 批量更新
    #[instrument(skip(self, records), level = "debug", fields(tenant = %tenant, count = records.len()))]
    pub async fn update_all(&self, tenant: &TenantKey, mut records: Vec<Record>) -> Result<Vec<Record>> {
        let op = Operation::UpdateAll;
        let intents = self.intents(op);
        let now = self.clock.now_millis();
        for record in records.iter_mut() {
            record.updated = Some(now);
        }

        self.call_store(op, self.store.update_all(tenant, &records)).await?;
        self.index_batch(op, intents.index, tenant, &records).await;
        self.cache_batch(op, intents.cache, tenant, &records).await;
        Ok(records)
    }

    /// 批量删除
    #[instrument(skip(self, records), level = "debug", fields(tenant = %tenant, count = records.len()))]
    pub async fn delete_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        let op = Operation::DeleteAll;
        let intents = self.intents(op);
        self.call_store(op, self.store.delete_all(tenant, records)).await?;
        self.index_batch(op, intents.index, tenant, records).await;
        self.cache_batch(op, intents.cache, tenant, records).await;
        Ok(())
    }

    /// 分页读取，直接调用存储
    #[instrument(skip(self, pager), level = "debug", fields(tenant = %tenant))]
    pub async fn read_page(&self, tenant: &TenantKey, pager: &mut Pager) -> Result<Vec<Record>> {
        self.call_store(Operation::ReadPage, self.store.read_page(tenant, pager))
            .await
    }

    fn validate(&self, op: Operation, record: &Record) -> Result<()> {
        record.validate().map_err(|e| {
            debug!("Rejected invalid record before {}: {}", op, e);
            self.metrics.record_request(STORE, op.as_str(), "invalid");
            e
        })
    }

    async fn call_store<T, F>(&self, op: Operation, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let outcome = call.await;
        self.metrics
            .record_duration(STORE, op.as_str(), start.elapsed().as_secs_f64());
        match &outcome {
            Ok(_) => self.metrics.record_request(STORE, op.as_str(), "success"),
            Err(e) => {
                warn!("Store {} failed: {}", op, e);
                self.metrics.record_request(STORE, op.as_str(), "error");
            }
        }
        outcome
    }

    /// 执行一次传播：受超时约束，失败只记录不上抛
    ///
    /// 后台模式下按 `(tenant, id)` 排队，同一记录的传播按提交顺序执行。
    async fn propagate<F>(
        &self,
        layer: &'static str,
        op: Operation,
        tenant: &TenantKey,
        ids: &[String],
        task: F,
    ) where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let metrics = self.metrics.clone();
        let limit = self.settings.propagation_timeout;
        let guarded = async move {
            let start = Instant::now();
            let outcome = match tokio::time::timeout(limit, task).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TriadError::Timeout(format!(
                    "{} {} exceeded {}ms",
                    layer,
                    op,
                    limit.as_millis()
                ))),
            };
            metrics.record_duration(layer, op.as_str(), start.elapsed().as_secs_f64());
            match outcome {
                Ok(()) => metrics.record_request(layer, op.as_str(), "success"),
                Err(e) => {
                    warn!("Propagation to {} failed during {}: {}", layer, op, e);
                    metrics.record_request(layer, op.as_str(), "error");
                }
            }
        };
        match self.settings.propagation {
            PropagationMode::Inline => guarded.await,
            PropagationMode::Background => {
                self.lanes.submit(tenant, ids, guarded);
            }
        }
    }

    async fn index_one(&self, op: Operation, intent: IndexIntent, tenant: &TenantKey, record: &Record) {
        let index = self.index.clone();
        let owner = tenant.clone();
        let ids = [record.id.clone()];
        match intent {
            IndexIntent::Add => {
                if !record.indexed {
                    debug!("Record {} opted out of indexing", record.id);
                    return;
                }
                let record = record.clone();
                self.propagate(INDEX, op, tenant, &ids, async move {
                    index.index(&owner, &record).await
                })
                .await;
            }
            IndexIntent::Remove => {
                let record = record.clone();
                self.propagate(INDEX, op, tenant, &ids, async move {
                    index.unindex(&owner, &record).await
                })
                .await;
            }
            _ => {}
        }
    }

    async fn index_batch(&self, op: Operation, intent: IndexIntent, tenant: &TenantKey, records: &[Record]) {
        let adding = match intent {
            IndexIntent::AddAll => true,
            IndexIntent::RemoveAll => false,
            _ => return,
        };
        let batch: Vec<Record> = self
            .policy
            .filter(records)
            .into_iter()
            .filter(|r| !adding || (r.indexed && r.is_valid()))
            .cloned()
            .collect();
        if batch.is_empty() {
            debug!("Nothing to {} in index after filtering {} records", op, records.len());
            return;
        }
        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
        let index = self.index.clone();
        let owner = tenant.clone();
        if adding {
            self.propagate(INDEX, op, tenant, &ids, async move {
                index.index_all(&owner, &batch).await
            })
            .await;
        } else {
            self.propagate(INDEX, op, tenant, &ids, async move {
                index.unindex_all(&owner, &batch).await
            })
            .await;
        }
    }

    async fn cache_one(&self, op: Operation, intent: CacheIntent, tenant: &TenantKey, record: &Record) {
        if is_blank(&record.id) {
            return;
        }
        let cache = self.cache.clone();
        let owner = tenant.clone();
        let ids = [record.id.clone()];
        match intent {
            CacheIntent::Put => {
                if !record.cached {
                    debug!("Record {} opted out of caching", record.id);
                    return;
                }
                let record = record.clone();
                self.propagate(CACHE, op, tenant, &ids, async move {
                    cache.put_value(&owner, &record.id, &record, None).await
                })
                .await;
            }
            CacheIntent::Delete => {
                let id = record.id.clone();
                self.propagate(CACHE, op, tenant, &ids, async move {
                    cache.remove(&owner, &id).await
                })
                .await;
            }
            _ => {}
        }
    }

    async fn cache_batch(&self, op: Operation, intent: CacheIntent, tenant: &TenantKey, records: &[Record]) {
        let filtered = self.policy.filter(records);
        match intent {
            CacheIntent::PutAll => {
                let entries: Vec<(String, Option<Record>)> = filtered
                    .into_iter()
                    .filter(|r| r.cached && r.is_valid())
                    .map(|r| (r.id.clone(), Some(r.clone())))
                    .collect();
                self.cache_entries(op, tenant, entries).await;
            }
            CacheIntent::DeleteAll => {
                let ids: Vec<String> = filtered
                    .into_iter()
                    .filter(|r| !is_blank(&r.id))
                    .map(|r| r.id.clone())
                    .collect();
                if ids.is_empty() {
                    return;
                }
                let cache = self.cache.clone();
                let owner = tenant.clone();
                let keys = ids.clone();
                self.propagate(CACHE, op, tenant, &keys, async move {
                    cache.remove_all(&owner, &ids).await
                })
                .await;
            }
            _ => {}
        }
    }

    async fn cache_entries(&self, op: Operation, tenant: &TenantKey, entries: Vec<(String, Option<Record>)>) {
        if entries.is_empty() {
            return;
        }
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
        let cache = self.cache.clone();
        let owner = tenant.clone();
        self.propagate(CACHE, op, tenant, &ids, async move {
            cache.put_all_values(&owner, entries).await
        })
        .await;
    }

    /// 从缓存中取出可解码的记录，解码失败的条目视为未命中
    async fn cached_records(&self, op: Operation, tenant: &TenantKey, ids: &[String]) -> HashMap<String, Record> {
        let raw = match self.cache.get_all(tenant, ids).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Batch cache read failed: tenant={}, error={}", tenant, e);
                self.metrics.record_request(CACHE, op.as_str(), "error");
                return HashMap::new();
            }
        };
        let serializer = self.cache.serializer();
        raw.into_iter()
            .filter_map(|(id, bytes)| match serializer.deserialize::<Record>(&bytes) {
                Ok(record) => Some((id, record)),
                Err(e) => {
                    warn!("Dropping undecodable cache entry {}: {}", id, e);
                    None
                }
            })
            .collect()
    }
}

/// 编排器构建器
#[derive(Default)]
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn PrimaryStore>>,
    index: Option<Arc<dyn SearchIndex>>,
    cache: Option<Arc<dyn CacheStore>>,
    registry: Option<Arc<Registry>>,
    policy: Option<SpecialObjectPolicy>,
    ids: Option<Arc<IdGenerator>>,
    clock: Option<SharedClock>,
    settings: OrchestratorSettings,
}

impl OrchestratorBuilder {
    pub fn store(mut self, store: Arc<dyn PrimaryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// 直接指定记录缓存，构建时以 `settings.cache_name` 注册到注册表
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn policy(mut self, policy: SpecialObjectPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.settings.cache_enabled = enabled;
        self
    }

    pub fn index_enabled(mut self, enabled: bool) -> Self {
        self.settings.index_enabled = enabled;
        self
    }

    pub fn propagation(mut self, mode: PropagationMode) -> Self {
        self.settings.propagation = mode;
        self
    }

    pub fn propagation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.propagation_timeout = timeout;
        self
    }

    /// 构建编排器
    ///
    /// 注册表中没有名为 `settings.cache_name` 的缓存时，会创建一个使用默认 TTL 的内存缓存。
    pub fn build(self) -> Result<Orchestrator> {
        let store = self
            .store
            .ok_or_else(|| TriadError::ConfigError("primary store is required".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| TriadError::ConfigError("search index is required".to_string()))?;
        if self.settings.propagation_timeout.is_zero() {
            return Err(TriadError::ConfigError(
                "propagation timeout must be positive".to_string(),
            ));
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let registry = self.registry.unwrap_or_default();
        let cache_name = self.settings.cache_name.clone();

        if let Some(cache) = self.cache {
            registry.register(cache_name.clone(), cache);
        }
        let cache = match registry.cache(&cache_name) {
            Ok(cache) => cache,
            Err(_) => {
                let cache: Arc<dyn CacheStore> = Arc::new(
                    MemoryCache::new(
                        cache_name.clone(),
                        DEFAULT_MAX_CAPACITY,
                        Some(Duration::from_secs(DEFAULT_TTL_SECS)),
                    )
                    .with_clock(clock.clone()),
                );
                registry.register(cache_name, cache.clone());
                cache
            }
        };
        let ids = match self.ids {
            Some(ids) => ids,
            None => Arc::new(IdGenerator::snowflake(0, clock.clone())?),
        };

        Ok(Orchestrator {
            store,
            index,
            cache,
            metrics: registry.metrics(),
            registry,
            policy: self.policy.unwrap_or_default(),
            ids,
            clock,
            settings: self.settings,
            lanes: PropagationLanes::default(),
        })
    }
}
