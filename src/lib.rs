//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! oxtriad - 多租户记录的一致性编排库
//!
//! 以主存储为唯一权威来源，按照每个操作固定的意图，
//! 把写入与读取尽力传播到搜索索引和按租户隔离的缓存。

#![doc(html_root_url = "https://docs.rs/oxtriad/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod index;
pub mod intent;
pub mod manager;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
mod propagation;
pub mod record;
pub mod serialization;
pub mod store;
pub mod tenant;
pub mod utils;

// Re-export commonly used items
pub use cache::{CacheExt, CacheStore, MemoryCache, RedisCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, PropagationMode};
pub use error::{Result, TriadError};
pub use id::IdGenerator;
pub use index::{MemoryIndex, SearchIndex};
pub use intent::{CacheIntent, IndexIntent, IntentPair, Operation};
pub use manager::Registry;
pub use metrics::Metrics;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorSettings};
pub use policy::SpecialObjectPolicy;
pub use record::Record;
pub use store::{MemoryStore, Pager, PrimaryStore};
pub use tenant::TenantKey;

/// oxtriad 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
