//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 索引意图、缓存意图以及操作到意图的静态映射表。

use std::fmt;

/// 存储调用之后搜索索引需要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexIntent {
    None,
    Add,
    Remove,
    AddAll,
    RemoveAll,
}

/// 缓存参与存储调用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheIntent {
    None,
    Get,
    Put,
    Delete,
    GetAll,
    PutAll,
    DeleteAll,
}

/// 一个操作的意图组合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntentPair {
    pub index: IndexIntent,
    pub cache: CacheIntent,
}

impl IntentPair {
    pub const fn new(index: IndexIntent, cache: CacheIntent) -> Self {
        Self { index, cache }
    }

    /// 按进程级开关降级：关闭的关注点视为 `None`
    pub const fn effective(self, cache_enabled: bool, index_enabled: bool) -> Self {
        Self {
            index: if index_enabled {
                self.index
            } else {
                IndexIntent::None
            },
            cache: if cache_enabled {
                self.cache
            } else {
                CacheIntent::None
            },
        }
    }

    /// 两个意图都为 `None` 时直接调用存储
    pub const fn is_passthrough(&self) -> bool {
        matches!(self.index, IndexIntent::None) && matches!(self.cache, CacheIntent::None)
    }
}

/// 主存储操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    CreateAll,
    ReadAll,
    UpdateAll,
    DeleteAll,
    ReadPage,
}

impl Operation {
    /// 全部操作
    pub const ALL: [Operation; 9] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
        Operation::CreateAll,
        Operation::ReadAll,
        Operation::UpdateAll,
        Operation::DeleteAll,
        Operation::ReadPage,
    ];

    /// 操作对应的固定意图
    pub const fn intents(self) -> IntentPair {
        use CacheIntent as C;
        use IndexIntent as I;
        match self {
            Operation::Create => IntentPair::new(I::Add, C::Put),
            Operation::Read => IntentPair::new(I::None, C::Get),
            Operation::Update => IntentPair::new(I::Add, C::Put),
            Operation::Delete => IntentPair::new(I::Remove, C::Delete),
            Operation::CreateAll => IntentPair::new(I::AddAll, C::PutAll),
            Operation::ReadAll => IntentPair::new(I::None, C::GetAll),
            Operation::UpdateAll => IntentPair::new(I::AddAll, C::PutAll),
            Operation::DeleteAll => IntentPair::new(I::RemoveAll, C::DeleteAll),
            Operation::ReadPage => IntentPair::new(I::None, C::None),
        }
    }

    /// 用于日志和指标的名称
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::CreateAll => "create_all",
            Operation::ReadAll => "read_all",
            Operation::UpdateAll => "update_all",
            Operation::DeleteAll => "delete_all",
            Operation::ReadPage => "read_page",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
