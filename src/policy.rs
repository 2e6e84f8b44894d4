//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 特殊对象策略：哪些记录类型不参与批量索引和批量缓存传播。

use crate::record::Record;
use std::collections::HashSet;

/// 默认的特殊类型（租户定义与主体记录）
pub const DEFAULT_SPECIAL_KINDS: [&str; 2] = ["app", "user"];

/// 特殊对象策略
///
/// 单条操作不受影响，只有批量传播会过滤掉特殊记录。
#[derive(Debug, Clone)]
pub struct SpecialObjectPolicy {
    kinds: HashSet<String>,
}

impl SpecialObjectPolicy {
    /// 不含任何特殊类型的策略
    pub fn empty() -> Self {
        Self {
            kinds: HashSet::new(),
        }
    }

    /// 由给定类型集合构造
    pub fn with_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::empty();
        for kind in kinds {
            policy.register(kind);
        }
        policy
    }

    /// 注册特殊类型
    pub fn register(&mut self, kind: impl Into<String>) -> &mut Self {
        let kind = kind.into();
        let kind = kind.trim();
        if !kind.is_empty() {
            self.kinds.insert(kind.to_string());
        }
        self
    }

    /// 取消注册
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.kinds.remove(kind)
    }

    pub fn is_special(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// 已注册的类型
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    /// 过滤掉批量中的特殊记录
    pub fn filter<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| !self.is_special(&r.kind))
            .collect()
    }
}

impl Default for SpecialObjectPolicy {
    fn default() -> Self {
        Self::with_kinds(DEFAULT_SPECIAL_KINDS)
    }
}
