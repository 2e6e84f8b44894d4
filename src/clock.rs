//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 可注入的时间源。缓存过期与 ID 生成都通过 `Clock` 读取时间，
//! 测试中可以用 `ManualClock` 手动推进时间。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 时间源特征
pub trait Clock: Send + Sync {
    /// 自 Unix 纪元以来的毫秒数
    fn now_millis(&self) -> u64;

    /// 是否跟随真实时间流逝
    ///
    /// 只有跟随真实时间的时钟才允许缓存按 `Instant` 主动淘汰条目。
    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// 共享时间源
pub type SharedClock = Arc<dyn Clock>;

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// 手动时钟
///
/// 时间只在调用 `advance` 或 `set_millis` 时变化。
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// 以给定的毫秒时间点创建
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// 推进时间
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// 设置为指定时间点
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
