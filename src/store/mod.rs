//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 主存储适配器契约。
//!
//! 主存储是记录的唯一权威来源；缓存与索引都只是它的派生投影。
//! 对已删除的 id 重复调用必须安全：返回 `None`/`false`，而不是错误。

pub mod memory;

use crate::error::Result;
use crate::record::Record;
use crate::tenant::TenantKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use memory::MemoryStore;

/// 默认每页条数
pub const DEFAULT_PAGE_LIMIT: usize = 30;

/// 分页器
///
/// 以记录 id 做键集分页。设置了 `last_key` 时从该 id 之后继续，
/// 否则按 `page` 计算偏移。每次读取后存储会更新 `last_key`、`count` 并推进 `page`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    /// 页码，从 1 开始
    pub page: u64,
    /// 每页条数
    pub limit: usize,
    /// 上一页最后一条记录的 id
    pub last_key: Option<String>,
    /// 租户中的记录总数
    pub count: u64,
}

impl Default for Pager {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            last_key: None,
            count: 0,
        }
    }
}

impl Pager {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    /// 偏移量（仅在没有 `last_key` 时使用）
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit)
    }
}

/// 主存储适配器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// 创建记录，返回其 id；id 为空时返回 `None`
    async fn create(&self, tenant: &TenantKey, record: &Record) -> Result<Option<String>>;

    /// 读取记录
    async fn read(&self, tenant: &TenantKey, id: &str) -> Result<Option<Record>>;

    /// 更新已存在的记录，不存在时返回 `false`
    async fn update(&self, tenant: &TenantKey, record: &Record) -> Result<bool>;

    /// 删除记录，不存在时返回 `false`
    async fn delete(&self, tenant: &TenantKey, record: &Record) -> Result<bool>;

    async fn create_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()>;

    /// 批量读取，只返回存在的记录
    async fn read_all(&self, tenant: &TenantKey, ids: &[String])
        -> Result<HashMap<String, Record>>;

    async fn update_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()>;

    async fn delete_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()>;

    /// 分页读取
    async fn read_page(&self, tenant: &TenantKey, pager: &mut Pager) -> Result<Vec<Record>>;
}
