//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内搜索索引，按租户保存文档，支持按类型查找。

use super::SearchIndex;
use crate::error::Result;
use crate::record::Record;
use crate::tenant::TenantKey;
use crate::utils::is_blank;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// 进程内搜索索引
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: DashMap<TenantKey, HashMap<String, Record>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录是否在索引中
    pub fn contains(&self, tenant: &TenantKey, id: &str) -> bool {
        self.documents
            .get(tenant)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false)
    }

    /// 索引中的文档数
    pub fn count(&self, tenant: &TenantKey) -> usize {
        self.documents.get(tenant).map(|docs| docs.len()).unwrap_or(0)
    }

    /// 按类型查找，结果按 id 排序
    pub fn find_by_kind(&self, tenant: &TenantKey, kind: &str) -> Vec<Record> {
        let mut found: Vec<Record> = self
            .documents
            .get(tenant)
            .map(|docs| docs.values().filter(|r| r.kind == kind).cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    fn put(&self, tenant: &TenantKey, record: &Record) {
        if is_blank(&record.id) {
            return;
        }
        self.documents
            .entry(tenant.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
    }

    fn drop_doc(&self, tenant: &TenantKey, id: &str) {
        if let Some(mut docs) = self.documents.get_mut(tenant) {
            docs.remove(id);
        }
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index(&self, tenant: &TenantKey, record: &Record) -> Result<()> {
        self.put(tenant, record);
        Ok(())
    }

    async fn unindex(&self, tenant: &TenantKey, record: &Record) -> Result<()> {
        self.drop_doc(tenant, &record.id);
        Ok(())
    }

    async fn index_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        for record in records {
            self.put(tenant, record);
        }
        debug!("MemoryIndex index_all: tenant={}, count={}", tenant, records.len());
        Ok(())
    }

    async fn unindex_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        for record in records {
            self.drop_doc(tenant, &record.id);
        }
        Ok(())
    }
}
