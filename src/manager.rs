//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存注册表，负责按配置创建并持有所有具名缓存。
//!
//! 注册表由组装服务的一方创建并显式传给编排器，生命周期由它管理。

use crate::cache::{CacheStore, MemoryCache, RedisCache};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{CacheBackendType, Config};
use crate::error::{Result, TriadError};
use crate::metrics::Metrics;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 缓存注册表
pub struct Registry {
    caches: DashMap<String, Arc<dyn CacheStore>>,
    metrics: Arc<Metrics>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(Metrics::new()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("caches", &self.names())
            .finish()
    }
}

impl Registry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            caches: DashMap::new(),
            metrics,
        }
    }

    /// 根据配置创建所有缓存
    ///
    /// # 参数
    ///
    /// * `config` - 进程配置
    /// * `clock` - 内存缓存使用的时钟
    #[instrument(skip(config, clock), level = "info", fields(cache_count = config.caches.len()))]
    pub async fn from_config(config: &Config, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let registry = Self::default();

        for (name, cache_cfg) in &config.caches {
            let ttl = config.cache_ttl(name);
            let cache: Arc<dyn CacheStore> = match cache_cfg.backend {
                CacheBackendType::Memory => {
                    let cache = Arc::new(
                        MemoryCache::new(name.clone(), cache_cfg.max_capacity, ttl)
                            .with_clock(clock.clone()),
                    );
                    if cache_cfg.cleanup_interval_secs > 0 {
                        cache.spawn_janitor(Duration::from_secs(cache_cfg.cleanup_interval_secs));
                    }
                    cache
                }
                CacheBackendType::Redis => {
                    let redis_cfg = cache_cfg.redis.as_ref().ok_or_else(|| {
                        TriadError::ConfigError(format!("缺少{}的Redis配置", name))
                    })?;
                    Arc::new(RedisCache::connect(name, redis_cfg, ttl).await?)
                }
            };
            info!("Registered cache '{}' ({:?})", name, cache_cfg.backend);
            registry.register(name.clone(), cache);
        }
        Ok(registry)
    }

    /// 使用系统时钟根据配置创建
    pub async fn from_config_default(config: &Config) -> Result<Self> {
        Self::from_config(config, Arc::new(SystemClock)).await
    }

    /// 注册缓存，同名缓存会被替换并返回旧值
    pub fn register(
        &self,
        name: impl Into<String>,
        cache: Arc<dyn CacheStore>,
    ) -> Option<Arc<dyn CacheStore>> {
        self.caches.insert(name.into(), cache)
    }

    /// 获取指定名称的缓存
    pub fn cache(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        self.caches
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| TriadError::ConfigError(format!("未找到缓存{}", name)))
    }

    /// 已注册的缓存名称（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// 关闭并移除所有缓存
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown_all(&self) -> Result<()> {
        let caches: Vec<(String, Arc<dyn CacheStore>)> = self
            .caches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.caches.clear();

        let results = join_all(caches.iter().map(|(_, cache)| cache.shutdown())).await;

        let mut errors = Vec::new();
        for ((name, _), result) in caches.iter().zip(results) {
            match result {
                Ok(_) => info!("缓存 {} 已成功关闭", name),
                Err(e) => {
                    warn!("关闭缓存 {} 时出错: {}", name, e);
                    errors.push(format!("{}: {}", name, e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TriadError::Cache(format!(
                "部分缓存关闭失败: {}",
                errors.join(", ")
            )))
        }
    }
}
