//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 搜索索引适配器契约。编排器以“尽力而为”的方式调用它，错误只记录不上抛。

pub mod memory;

use crate::error::Result;
use crate::record::Record;
use crate::tenant::TenantKey;
use async_trait::async_trait;

pub use memory::MemoryIndex;

/// 搜索索引适配器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// 索引单条记录（已存在时覆盖）
    async fn index(&self, tenant: &TenantKey, record: &Record) -> Result<()>;

    /// 移除单条记录，记录不在索引中时为空操作
    async fn unindex(&self, tenant: &TenantKey, record: &Record) -> Result<()>;

    async fn index_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()>;

    async fn unindex_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()>;
}
