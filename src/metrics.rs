//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了编排层的指标收集功能。指标实例由组装服务的一方创建，
//! 并显式传入注册表和编排器，不使用全局静态状态。

use dashmap::DashMap;
use std::fmt::Write;
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储存储/索引/缓存三层的运行时指标
#[derive(Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "layer:op:result"
    requests_total: DashMap<String, u64>,
    /// 操作耗时（累积秒数与次数）
    /// key: "layer:op" -> (total_duration_secs, count)
    operation_duration: DashMap<String, (f64, u64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `layer` - 层（store/index/cache）
    /// * `op` - 操作类型
    /// * `result` - 操作结果（hit/miss/success/error/skipped）
    pub fn record_request(&self, layer: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "triad_request", layer, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", layer, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, layer: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", layer, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 查询请求计数
    pub fn request_count(&self, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", layer, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// 某一层某个结果的总计数（跨所有操作）
    pub fn total_for(&self, layer: &str, result: &str) -> u64 {
        self.requests_total
            .iter()
            .filter(|e| {
                let mut parts = e.key().split(':');
                parts.next() == Some(layer) && parts.nth(1) == Some(result)
            })
            .map(|e| *e.value())
            .sum()
    }

    /// 清空指标
    pub fn reset(&self) {
        self.requests_total.clear();
        self.operation_duration.clear();
    }

    /// 以 Prometheus 文本格式输出全部指标
    pub fn render(&self) -> String {
        let mut requests: Vec<(String, u64)> = self
            .requests_total
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        requests.sort();

        let mut durations: Vec<(String, (f64, u64))> = self
            .operation_duration
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        durations.sort_by(|a, b| a.0.cmp(&b.0));

        let mut output = String::new();
        for (k, v) in requests {
            let parts: Vec<&str> = k.split(':').collect();
            if parts.len() == 3 {
                let _ = writeln!(
                    output,
                    "triad_requests_total{{layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}",
                    parts[0], parts[1], parts[2], v
                );
            }
        }
        for (k, (total, count)) in durations {
            let parts: Vec<&str> = k.split(':').collect();
            if parts.len() == 2 {
                let _ = writeln!(
                    output,
                    "triad_operation_duration_seconds_sum{{layer=\"{}\", operation=\"{}\"}} {}",
                    parts[0], parts[1], total
                );
                let _ = writeln!(
                    output,
                    "triad_operation_duration_seconds_count{{layer=\"{}\", operation=\"{}\"}} {}",
                    parts[0], parts[1], count
                );
            }
        }
        output
    }
}
