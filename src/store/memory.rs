//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内主存储，按租户保存有序的记录集合。

use super::{Pager, PrimaryStore};
use crate::error::Result;
use crate::record::Record;
use crate::tenant::TenantKey;
use crate::utils::is_blank;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::{debug, instrument};

/// 进程内主存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: DashMap<TenantKey, BTreeMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 租户中的记录数
    pub fn len(&self, tenant: &TenantKey) -> usize {
        self.tenants.get(tenant).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, tenant: &TenantKey) -> bool {
        self.len(tenant) == 0
    }

    fn insert(&self, tenant: &TenantKey, record: &Record) -> bool {
        if is_blank(&record.id) {
            return false;
        }
        self.tenants
            .entry(tenant.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        true
    }

    fn replace(&self, tenant: &TenantKey, record: &Record) -> bool {
        let Some(mut records) = self.tenants.get_mut(tenant) else {
            return false;
        };
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                true
            }
            None => false,
        }
    }

    fn take(&self, tenant: &TenantKey, id: &str) -> bool {
        self.tenants
            .get_mut(tenant)
            .map(|mut records| records.remove(id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, id = %record.id))]
    async fn create(&self, tenant: &TenantKey, record: &Record) -> Result<Option<String>> {
        Ok(self.insert(tenant, record).then(|| record.id.clone()))
    }

    async fn read(&self, tenant: &TenantKey, id: &str) -> Result<Option<Record>> {
        if is_blank(id) {
            return Ok(None);
        }
        Ok(self
            .tenants
            .get(tenant)
            .and_then(|records| records.get(id).cloned()))
    }

    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, id = %record.id))]
    async fn update(&self, tenant: &TenantKey, record: &Record) -> Result<bool> {
        Ok(self.replace(tenant, record))
    }

    #[instrument(skip(self, record), level = "debug", fields(tenant = %tenant, id = %record.id))]
    async fn delete(&self, tenant: &TenantKey, record: &Record) -> Result<bool> {
        Ok(self.take(tenant, &record.id))
    }

    async fn create_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        let created = records.iter().filter(|r| self.insert(tenant, r)).count();
        debug!("MemoryStore create_all: tenant={}, created={}", tenant, created);
        Ok(())
    }

    async fn read_all(
        &self,
        tenant: &TenantKey,
        ids: &[String],
    ) -> Result<HashMap<String, Record>> {
        let Some(records) = self.tenants.get(tenant) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn update_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        for record in records {
            self.replace(tenant, record);
        }
        Ok(())
    }

    async fn delete_all(&self, tenant: &TenantKey, records: &[Record]) -> Result<()> {
        for record in records {
            self.take(tenant, &record.id);
        }
        Ok(())
    }

    #[instrument(skip(self, pager), level = "debug", fields(tenant = %tenant, page = pager.page))]
    async fn read_page(&self, tenant: &TenantKey, pager: &mut Pager) -> Result<Vec<Record>> {
        let Some(records) = self.tenants.get(tenant) else {
            pager.count = 0;
            return Ok(Vec::new());
        };
        pager.count = records.len() as u64;
        let page: Vec<Record> = match pager.last_key.as_deref() {
            Some(last) => records
                .range::<str, _>((Bound::Excluded(last), Bound::Unbounded))
                .take(pager.limit)
                .map(|(_, r)| r.clone())
                .collect(),
            None => records
                .values()
                .skip(pager.offset())
                .take(pager.limit)
                .cloned()
                .collect(),
        };
        if let Some(last) = page.last() {
            pager.last_key = Some(last.id.clone());
            pager.page += 1;
        }
        Ok(page)
    }
}
