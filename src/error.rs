//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了一致性编排层的错误类型和处理机制。

use thiserror::Error;

/// 编排层错误类型枚举
///
/// 调用方只会看到 `Validation` 和 `Store` 两类错误；
/// 缓存、索引相关的错误在编排器内部被记录并吞掉。
#[derive(Error, Debug)]
pub enum TriadError {
    /// 记录未通过合法性校验
    #[error("Validation error: {0}")]
    Validation(String),

    /// 主存储操作失败
    #[error("Store operation failed: {0}")]
    Store(String),

    /// 缓存操作失败
    #[error("Cache operation failed: {0}")]
    Cache(String),

    /// 搜索索引操作失败
    #[error("Index operation failed: {0}")]
    Index(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML 解析错误
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, TriadError>;
