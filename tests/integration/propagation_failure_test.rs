//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 传播失败测试：索引、缓存故障不影响调用方，存储故障原样返回

use crate::common::{
    doc, unique_tenant, CountingStore, FailingCache, Harness, RecordingIndex, SlowCache,
};
use oxtriad::{CacheStore, MemoryIndex, Orchestrator, PropagationMode, Record, TriadError};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

/// 测试索引故障被吞掉，缓存仍然写入
#[tokio::test]
async fn test_index_failure_does_not_fail_create() {
    let h = Harness::with_index(RecordingIndex::failing());
    let tenant = unique_tenant("index-down");

    let created = h.orchestrator.create(&tenant, doc("r1")).await.unwrap();
    assert!(created.is_some());
    assert_eq!(h.store.inner.len(&tenant), 1);
    assert!(h.cache.contains(&tenant, "r1").await.unwrap());
    assert_eq!(
        h.orchestrator.metrics().request_count("index", "create", "error"),
        1
    );

    h.orchestrator
        .create_all(&tenant, vec![doc("r2"), doc("r3")])
        .await
        .unwrap();
    assert_eq!(
        h.orchestrator.metrics().request_count("index", "create_all", "error"),
        1
    );
}

/// 测试索引超时被计为失败，调用方在超时之后返回
#[tokio::test]
async fn test_slow_index_times_out() {
    common::setup_logging();
    let store = Arc::new(CountingStore::new());
    let index = Arc::new(RecordingIndex::slow(Duration::from_secs(30)));
    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .index(index)
        .propagation_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let tenant = unique_tenant("index-slow");

    let started = std::time::Instant::now();
    orchestrator.create(&tenant, doc("r1")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        orchestrator.metrics().request_count("index", "create", "error"),
        1
    );
    assert!(orchestrator.cache().contains(&tenant, "r1").await.unwrap());
}

/// 测试缓存故障时所有读取都回落到存储
#[tokio::test]
async fn test_cache_failure_falls_back_to_store() {
    common::setup_logging();
    let store = Arc::new(CountingStore::new());
    let index = Arc::new(RecordingIndex::new());
    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .index(index.clone())
        .cache(Arc::new(FailingCache::new()))
        .build()
        .unwrap();
    let tenant = unique_tenant("cache-down");

    orchestrator.create(&tenant, doc("a")).await.unwrap();
    orchestrator.create(&tenant, doc("b")).await.unwrap();
    assert!(index.inner.contains(&tenant, "a"));

    assert!(orchestrator.read(&tenant, "a").await.unwrap().is_some());
    assert!(orchestrator.read(&tenant, "a").await.unwrap().is_some());
    assert_eq!(store.reads(), 2);

    let all = orchestrator
        .read_all(&tenant, &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert!(orchestrator.delete(&tenant, &doc("a")).await.unwrap());
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.request_count("cache", "create", "error"), 2);
    assert_eq!(metrics.request_count("cache", "read", "error"), 4);
    assert_eq!(metrics.request_count("cache", "delete", "error"), 1);
    assert!(metrics.total_for("cache", "error") >= 7);
}

/// 测试存储故障原样返回且不写缓存和索引
#[tokio::test]
async fn test_store_failure_skips_propagation() {
    let h = Harness::new();
    let tenant = unique_tenant("store-down");
    h.store.set_failing(true);

    let err = h.orchestrator.create(&tenant, doc("r1")).await.unwrap_err();
    assert!(matches!(err, TriadError::Store(_)));
    assert!(!h.index.inner.contains(&tenant, "r1"));
    assert!(!h.cache.contains(&tenant, "r1").await.unwrap());

    let err = h
        .orchestrator
        .create_all(&tenant, vec![doc("r2")])
        .await
        .unwrap_err();
    assert!(matches!(err, TriadError::Store(_)));
    assert!(h.index.batches().is_empty());

    let err = h.orchestrator.read(&tenant, "r1").await.unwrap_err();
    assert!(matches!(err, TriadError::Store(_)));
    assert_eq!(
        h.orchestrator.metrics().request_count("store", "create", "error"),
        1
    );
}

/// 测试存储故障时删除仍然从索引移除，但缓存保持不变
#[tokio::test]
async fn test_store_failure_on_delete_still_unindexes() {
    let h = Harness::new();
    let tenant = unique_tenant("store-down-delete");
    let created = h
        .orchestrator
        .create(&tenant, doc("r1"))
        .await
        .unwrap()
        .unwrap();
    h.store.set_failing(true);

    let err = h.orchestrator.delete(&tenant, &created).await.unwrap_err();
    assert!(matches!(err, TriadError::Store(_)));
    assert_eq!(h.index.unindexed(), vec!["r1".to_string()]);
    assert!(!h.index.inner.contains(&tenant, "r1"));
    assert!(h.cache.contains(&tenant, "r1").await.unwrap());
}

/// 测试不合法的记录不会到达存储
#[tokio::test]
async fn test_invalid_record_is_rejected() {
    let h = Harness::new();
    let tenant = unique_tenant("invalid");

    let err = h
        .orchestrator
        .create(&tenant, Record::new("has space"))
        .await
        .unwrap_err();
    assert!(matches!(err, TriadError::Validation(_)));
    assert_eq!(h.store.creates.load(std::sync::atomic::Ordering::SeqCst), 0);

    let created = h
        .orchestrator
        .create_all(&tenant, vec![Record::new("has space").with_id("x"), doc("ok")])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    // 存储是权威来源，接受全部记录；传播只包含合法记录
    assert_eq!(h.store.inner.len(&tenant), 2);
    assert_eq!(h.index.batches(), vec![vec!["ok".to_string()]]);
    assert!(!h.cache.contains(&tenant, "x").await.unwrap());
}

/// 测试后台传播模式
///
/// 调用方在索引完成之前返回，传播随后在后台完成
#[tokio::test]
async fn test_background_propagation_completes() {
    common::setup_logging();
    let store = Arc::new(CountingStore::new());
    let index = Arc::new(RecordingIndex::slow(Duration::from_millis(100)));
    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .index(index.clone())
        .propagation(PropagationMode::Background)
        .build()
        .unwrap();
    let tenant = unique_tenant("background");

    orchestrator.create(&tenant, doc("r1")).await.unwrap();
    assert!(!index.inner.contains(&tenant, "r1"));

    let mut indexed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if index.inner.contains(&tenant, "r1") {
            indexed = true;
            break;
        }
    }
    assert!(indexed);
    orchestrator.wait_for_propagation().await;
    assert!(orchestrator.cache().contains(&tenant, "r1").await.unwrap());
}

/// 测试后台模式下同一记录的删除不会被先前较慢的写入覆盖
#[tokio::test]
async fn test_background_delete_is_not_overtaken_by_slow_put() {
    common::setup_logging();
    let store = Arc::new(CountingStore::new());
    let index = Arc::new(MemoryIndex::new());
    let cache = Arc::new(SlowCache::new(Duration::from_millis(50)));
    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .index(index.clone())
        .cache(cache.clone())
        .propagation(PropagationMode::Background)
        .build()
        .unwrap();
    let tenant = unique_tenant("background-order");

    let created = orchestrator
        .create(&tenant, doc("r1"))
        .await
        .unwrap()
        .unwrap();
    assert!(orchestrator.delete(&tenant, &created).await.unwrap());
    orchestrator.wait_for_propagation().await;

    assert_eq!(store.inner.len(&tenant), 0);
    assert!(!cache.inner.contains(&tenant, "r1").await.unwrap());
    assert!(!index.contains(&tenant, "r1"));
    assert_eq!(orchestrator.read(&tenant, "r1").await.unwrap(), None);
}

/// 测试后台模式下批量删除排在先前的单条写入之后
#[tokio::test]
async fn test_background_batch_delete_waits_for_pending_puts() {
    common::setup_logging();
    let store = Arc::new(CountingStore::new());
    let cache = Arc::new(SlowCache::new(Duration::from_millis(50)));
    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .index(Arc::new(MemoryIndex::new()))
        .cache(cache.clone())
        .propagation(PropagationMode::Background)
        .build()
        .unwrap();
    let tenant = unique_tenant("background-batch");

    let a = orchestrator.create(&tenant, doc("a")).await.unwrap().unwrap();
    let b = orchestrator.create(&tenant, doc("b")).await.unwrap().unwrap();
    orchestrator.delete_all(&tenant, &[a, b]).await.unwrap();
    orchestrator.wait_for_propagation().await;

    let keys = vec!["a".to_string(), "b".to_string()];
    assert!(cache.inner.get_all(&tenant, &keys).await.unwrap().is_empty());
    assert_eq!(
        orchestrator.metrics().request_count("cache", "delete_all", "success"),
        1
    );
}
