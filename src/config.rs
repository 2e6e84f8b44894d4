//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程级配置结构和解析逻辑。配置在启动时读取一次，
//! 之后在进程生命周期内视为不可变。

use crate::error::{Result, TriadError};
use crate::policy::DEFAULT_SPECIAL_KINDS;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 默认的记录缓存名称
pub const DEFAULT_RECORD_CACHE: &str = "records";

/// 默认的缓存过期时间（秒）
pub const DEFAULT_TTL_SECS: u64 = 600;

/// 内存缓存默认的每租户容量
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default = "default_caches")]
    pub caches: HashMap<String, CacheConfig>,
}

fn default_caches() -> HashMap<String, CacheConfig> {
    let mut caches = HashMap::new();
    caches.insert(DEFAULT_RECORD_CACHE.to_string(), CacheConfig::default());
    caches
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: Some(CONFIG_VERSION),
            global: GlobalConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            caches: default_caches(),
        }
    }
}

/// 全局配置
///
/// 缓存、索引开关与默认 TTL
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 是否启用缓存传播
    pub cache_enabled: bool,
    /// 是否启用索引传播
    pub index_enabled: bool,
    /// 默认的缓存过期时间（秒），0 表示不过期
    pub default_ttl_secs: u64,
    /// 传播方式
    pub propagation: PropagationMode,
    /// 单次传播的超时时间（毫秒）
    pub propagation_timeout_ms: u64,
    /// 不参与批量传播的记录类型
    pub special_kinds: Vec<String>,
    /// 标识生成配置
    pub id: IdConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            index_enabled: true,
            default_ttl_secs: DEFAULT_TTL_SECS,
            propagation: PropagationMode::Inline,
            propagation_timeout_ms: 5000,
            special_kinds: DEFAULT_SPECIAL_KINDS.iter().map(|k| k.to_string()).collect(),
            id: IdConfig::default(),
        }
    }
}

/// 传播方式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMode {
    /// 在调用方的任务中等待传播完成
    #[default]
    Inline,
    /// 在后台任务中传播，调用方放弃请求也不会中断传播
    Background,
}

/// 标识生成策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    #[default]
    Snowflake,
    Uuid,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct IdConfig {
    pub strategy: IdStrategy,
    /// Snowflake 节点号（0..=1023）
    pub node_id: u16,
}

/// 编排器配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 记录缓存使用的缓存名称
    pub cache: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache: DEFAULT_RECORD_CACHE.to_string(),
        }
    }
}

/// 缓存后端类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendType {
    /// 进程内缓存
    #[default]
    Memory,
    /// Redis 缓存
    Redis,
}

/// 单个缓存的配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendType,
    /// 覆盖全局默认 TTL（秒）
    pub default_ttl_secs: Option<u64>,
    /// 每个租户的最大条目数（仅内存后端）
    pub max_capacity: u64,
    /// 过期清理间隔（秒），0表示禁用自动清理（仅内存后端）
    pub cleanup_interval_secs: u64,
    /// Redis 配置
    pub redis: Option<RedisConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendType::Memory,
            default_ttl_secs: None,
            max_capacity: DEFAULT_MAX_CAPACITY,
            cleanup_interval_secs: 0,
            redis: None,
        }
    }
}

/// Redis 缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 所有键的公共前缀
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            connection_timeout_ms: 5000,
            key_prefix: "oxtriad".to_string(),
        }
    }
}

impl Config {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// 指定缓存的默认 TTL，`None` 表示不过期
    pub fn cache_ttl(&self, name: &str) -> Option<Duration> {
        let secs = self
            .caches
            .get(name)
            .and_then(|c| c.default_ttl_secs)
            .unwrap_or(self.global.default_ttl_secs);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(TriadError::ConfigError)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if let Some(version) = self.config_version {
            if version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl_secs > MAX_TTL_SECS {
            return Err("Global default_ttl_secs cannot exceed 30 days (2592000 seconds)".into());
        }

        if !(1..=60000).contains(&self.global.propagation_timeout_ms) {
            return Err("Global propagation_timeout_ms must be between 1 and 60000 ms".into());
        }

        if self.global.id.node_id > 1023 {
            return Err(format!(
                "id node_id {} must be between 0 and 1023",
                self.global.id.node_id
            ));
        }

        if self.global.special_kinds.iter().any(|k| k.trim().is_empty()) {
            return Err("special_kinds cannot contain blank entries".into());
        }

        if self.caches.is_empty() {
            return Err("At least one cache must be configured".into());
        }

        if !self.caches.contains_key(&self.orchestrator.cache) {
            return Err(format!(
                "orchestrator cache '{}' is not configured",
                self.orchestrator.cache
            ));
        }

        for (name, cache) in &self.caches {
            if name.trim().is_empty() {
                return Err("Cache name cannot be empty".into());
            }

            if name.len() > 64 {
                return Err(format!(
                    "Cache name '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            if let Some(ttl) = cache.default_ttl_secs {
                if ttl > MAX_TTL_SECS {
                    return Err(format!("Cache '{}' TTL cannot exceed 30 days", name));
                }
            }

            match cache.backend {
                CacheBackendType::Memory => {
                    if cache.max_capacity == 0 {
                        return Err(format!("Cache '{}' max_capacity cannot be zero", name));
                    }
                    if cache.max_capacity > 10_000_000 {
                        return Err(format!(
                            "Cache '{}' max_capacity cannot exceed 10,000,000",
                            name
                        ));
                    }
                }
                CacheBackendType::Redis => {
                    let redis = cache.redis.as_ref().ok_or_else(|| {
                        format!("Cache '{}' uses the redis backend but has no [redis] section", name)
                    })?;
                    if redis.connection_string.expose_secret().trim().is_empty() {
                        return Err(format!("Cache '{}' redis connection_string is empty", name));
                    }
                    if !(100..=30000).contains(&redis.connection_timeout_ms) {
                        return Err(format!(
                            "Cache '{}' connection_timeout_ms must be between 100 and 30000 ms",
                            name
                        ));
                    }
                    if redis.key_prefix.trim().is_empty() || redis.key_prefix.contains(' ') {
                        return Err(format!("Cache '{}' key_prefix is invalid", name));
                    }
                }
            }
        }

        Ok(())
    }
}
