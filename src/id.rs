//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 记录标识生成器。
//!
//! Snowflake 布局（64 位）：
//! - 41 位：自 2024-01-01T00:00:00Z 起的毫秒数
//! - 10 位：节点号
//! - 12 位：同一毫秒内的序列号
//!
//! 通过对上一次发放的 id 做 CAS 来保证进程内严格递增，不需要锁；
//! 时钟停滞或回拨时直接借用下一个序列号（必要时借用下一毫秒）。

use crate::clock::{SharedClock, SystemClock};
use crate::config::{IdConfig, IdStrategy};
use crate::error::{Result, TriadError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 自定义纪元（2024-01-01T00:00:00Z，毫秒）
pub const SNOWFLAKE_EPOCH_MILLIS: u64 = 1_704_067_200_000;

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_NODE_ID: u64 = (1 << NODE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_SHIFT: u64 = NODE_BITS + SEQUENCE_BITS;

enum Strategy {
    Snowflake {
        node_id: u64,
        last: AtomicU64,
        clock: SharedClock,
    },
    Uuid,
}

/// 标识生成器
///
/// 可在任意数量的线程/任务中并发调用。
pub struct IdGenerator {
    strategy: Strategy,
}

impl IdGenerator {
    /// 创建 Snowflake 生成器
    pub fn snowflake(node_id: u16, clock: SharedClock) -> Result<Self> {
        let node_id = node_id as u64;
        if node_id > MAX_NODE_ID {
            return Err(TriadError::ConfigError(format!(
                "node_id {} exceeds maximum {}",
                node_id, MAX_NODE_ID
            )));
        }
        Ok(Self {
            strategy: Strategy::Snowflake {
                node_id,
                last: AtomicU64::new(0),
                clock,
            },
        })
    }

    /// 创建 UUID v4 生成器
    pub fn uuid() -> Self {
        Self {
            strategy: Strategy::Uuid,
        }
    }

    /// 按配置创建
    pub fn from_config(config: &IdConfig, clock: SharedClock) -> Result<Self> {
        match config.strategy {
            IdStrategy::Snowflake => Self::snowflake(config.node_id, clock),
            IdStrategy::Uuid => Ok(Self::uuid()),
        }
    }

    /// 生成新的标识
    pub fn new_id(&self) -> String {
        match &self.strategy {
            Strategy::Snowflake {
                node_id,
                last,
                clock,
            } => next_snowflake(*node_id, last, clock.now_millis()).to_string(),
            Strategy::Uuid => uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            strategy: Strategy::Snowflake {
                node_id: 0,
                last: AtomicU64::new(0),
                clock: Arc::new(SystemClock),
            },
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strategy {
            Strategy::Snowflake { node_id, .. } => {
                write!(f, "IdGenerator::Snowflake(node={})", node_id)
            }
            Strategy::Uuid => write!(f, "IdGenerator::Uuid"),
        }
    }
}

fn next_snowflake(node_id: u64, last: &AtomicU64, now_millis: u64) -> u64 {
    let elapsed = now_millis.saturating_sub(SNOWFLAKE_EPOCH_MILLIS);
    let base = (elapsed << TIMESTAMP_SHIFT) | (node_id << SEQUENCE_BITS);
    let mut current = last.load(Ordering::Acquire);
    loop {
        let candidate = if base > current {
            base
        } else if current & SEQUENCE_MASK < SEQUENCE_MASK {
            current + 1
        } else {
            (((current >> TIMESTAMP_SHIFT) + 1) << TIMESTAMP_SHIFT) | (node_id << SEQUENCE_BITS)
        };
        match last.compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return candidate,
            Err(actual) => current = actual,
        }
    }
}

/// 从 Snowflake id 中解析出毫秒时间戳和节点号
pub fn decode_snowflake(id: &str) -> Option<(u64, u16)> {
    let raw: u64 = id.parse().ok()?;
    let millis = (raw >> TIMESTAMP_SHIFT) + SNOWFLAKE_EPOCH_MILLIS;
    let node = ((raw >> SEQUENCE_BITS) & MAX_NODE_ID) as u16;
    Some((millis, node))
}
