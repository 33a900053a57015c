//! Fail-open行为测试
//!
//! 后端被禁用/不可达时，所有缓存操作必须降级为miss/no-op，
//! 绝不向业务路径抛出异常

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use super::{memoize, CacheNamespace, CacheService, WarmupEntry};
use crate::infrastructure::config::CacheConfig;

fn disabled_service() -> CacheService {
    let mut config = CacheConfig::load_default();
    config.enabled = false;
    config.metrics_enabled = true;
    CacheService::new(config)
}

#[tokio::test]
async fn test_get_returns_default_when_disabled() {
    let cache = disabled_service();
    cache.initialize().await.expect("禁用配置下初始化应该成功");

    let value: Option<serde_json::Value> = cache.get("wardrobe:user:1").await;
    assert!(value.is_none());

    let fallback = cache
        .get_or("wardrobe:user:1", json!({"source": "db"}))
        .await;
    assert_eq!(fallback, json!({"source": "db"}));
}

#[tokio::test]
async fn test_writes_return_false_without_raising() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    assert!(!cache.set("wardrobe:user:1", &json!({"a": 1}), Some(60)).await);
    assert!(!cache.delete("wardrobe:user:1").await);
    assert!(!cache.exists("wardrobe:user:1").await);
    assert_eq!(cache.ttl("wardrobe:user:1").await, -2);
    assert_eq!(cache.invalidate_pattern("wardrobe:user:*").await, 0);
}

#[tokio::test]
async fn test_category_helpers_fail_open() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    assert!(
        !cache
            .set_analysis_cache("abc123", "facial", json!({"shape": "oval"}))
            .await
    );
    assert!(cache.get_analysis_cache("abc123", "facial").await.is_none());
    assert!(cache.get_session_cache("42", "styling").await.is_none());
    assert!(
        cache
            .get_recommendations_cache("outfits", &json!({"season": "fall"}))
            .await
            .is_none()
    );
}

/// N个保证miss的并发get恰好使miss计数器增加N（无丢失更新）
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_misses_counted_exactly() {
    let cache = Arc::new(disabled_service());
    cache.initialize().await.unwrap();
    cache.reset_metrics();

    let n = 100usize;
    let mut tasks = Vec::new();
    for i in 0..n {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            let _: Option<serde_json::Value> = cache.get(&format!("wardrobe:user:{}", i)).await;
        }));
    }
    for task in tasks {
        task.await.expect("任务不应panic");
    }

    let snapshot = cache.metrics_snapshot();
    assert_eq!(snapshot.misses, n as u64);
    assert_eq!(snapshot.hits, 0);
    assert_eq!(snapshot.hit_rate, 0.0);
}

/// 无single-flight：禁用存储下每次get_or_compute都会计算
#[tokio::test]
async fn test_get_or_compute_always_computes_when_disabled() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    let calls = AtomicUsize::new(0);
    for _ in 0..2 {
        let result: Result<serde_json::Value, std::convert::Infallible> = cache
            .get_or_compute("wardrobe:analysis:facial:h1", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"shape": "oval"}))
            })
            .await;
        assert_eq!(result.unwrap(), json!({"shape": "oval"}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_get_or_compute_propagates_compute_error() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    let result: Result<serde_json::Value, String> = cache
        .get_or_compute("wardrobe:analysis:facial:h2", Some(60), || async {
            Err("上游AI服务失败".to_string())
        })
        .await;
    assert_eq!(result.unwrap_err(), "上游AI服务失败");
}

#[tokio::test]
async fn test_memoize_fail_open() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    let calls = AtomicUsize::new(0);
    for _ in 0..2 {
        let result: Result<serde_json::Value, std::convert::Infallible> = memoize(
            &cache,
            CacheNamespace::Analysis,
            "analyze_outfit",
            &json!({"item_ids": [1, 2, 3]}),
            Some(300),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"score": 0.9}))
            },
        )
        .await;
        assert_eq!(result.unwrap(), json!({"score": 0.9}));
    }
    // 禁用存储下记忆化不生效，但计算照常返回
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_warmup_respects_disabled_flag() {
    let mut config = CacheConfig::load_default();
    config.enabled = false;
    config.warmup_enabled = false;
    let cache = CacheService::new(config);
    cache.initialize().await.unwrap();

    let entries = vec![WarmupEntry {
        config_type: "styles".to_string(),
        identifier: None,
        value: json!(["casual", "formal"]),
        ttl_seconds: None,
    }];
    assert_eq!(cache.warm_up(&entries).await, 0);
}

#[tokio::test]
async fn test_health_check_unhealthy_when_disabled() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    let health = cache.health_check().await;
    assert_eq!(health.status, "unhealthy");
    assert!(health.reason.is_some());
}

#[tokio::test]
async fn test_analysis_stats_empty_when_disabled() {
    let cache = disabled_service();
    cache.initialize().await.unwrap();

    let stats = cache.analysis_stats().await;
    assert_eq!(stats.total_entries, 0);
    assert!(stats.types.is_empty());
}
