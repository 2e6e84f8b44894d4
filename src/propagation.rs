//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台传播的按记录排队机制。
//!
//! 同一租户下同一记录的后台传播严格按提交顺序执行，
//! 不同记录的传播互不等待。批量传播会同时排在它涉及的每条记录之后。

use crate::tenant::TenantKey;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type LaneKey = (TenantKey, String);

/// 任务结束信号，任务正常结束、失败或被中止时都会完成
type Done = Shared<BoxFuture<'static, ()>>;

/// 后台传播队列
///
/// 每个键只保存最后提交的任务；新任务先等待这些前驱结束再执行。
#[derive(Default)]
pub(crate) struct PropagationLanes {
    tails: Arc<Mutex<HashMap<LaneKey, (u64, Done)>>>,
    next_ticket: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PropagationLanes {
    /// 提交一个后台任务
    ///
    /// 登记在调用方的任务中同步完成，所以提交顺序就是执行顺序。
    /// 多个键的登记在同一把锁内完成，批量任务之间不会互相等待成环。
    pub(crate) fn submit<F>(&self, tenant: &TenantKey, ids: &[String], task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let done: Done = done_rx.map(|_| ()).boxed().shared();

        let mut keys: Vec<LaneKey> = ids.iter().map(|id| (tenant.clone(), id.clone())).collect();
        keys.sort();
        keys.dedup();

        let (ticket, previous) = {
            let mut tails = lock(&self.tails);
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            let previous: Vec<Done> = keys
                .iter()
                .filter_map(|key| {
                    tails
                        .insert(key.clone(), (ticket, done.clone()))
                        .map(|(_, prev)| prev)
                })
                .collect();
            (ticket, previous)
        };

        let tails = self.tails.clone();
        tokio::spawn(async move {
            join_all(previous).await;
            task.await;
            {
                let mut tails = lock(&tails);
                for key in keys {
                    if matches!(tails.get(&key), Some((t, _)) if *t == ticket) {
                        tails.remove(&key);
                    }
                }
            }
            let _ = done_tx.send(());
        })
    }

    /// 等待当前已提交的所有任务结束
    pub(crate) async fn drain(&self) {
        let pending: Vec<Done> = lock(&self.tails)
            .values()
            .map(|(_, done)| done.clone())
            .collect();
        join_all(pending).await;
    }

    /// 仍有任务排队或执行中的键数
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        lock(&self.tails).len()
    }
}
