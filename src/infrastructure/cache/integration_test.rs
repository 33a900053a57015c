//! 缓存服务集成测试
//!
//! 需要本地Redis实例的端到端场景

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use super::CacheService;
use crate::infrastructure::config::CacheConfig;

fn live_service(prefix: &str) -> CacheService {
    let mut config = CacheConfig::load_default();
    config.enabled = true;
    config.key_prefix = format!("it_{}:", prefix);
    CacheService::new(config)
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_analysis_cache_scenario() {
    let cache = live_service("analysis");
    cache.initialize().await.expect("初始化应该成功");

    assert!(
        cache
            .set_analysis_cache("abc123", "facial", json!({"shape": "oval"}))
            .await
    );

    let record = cache
        .get_analysis_cache("abc123", "facial")
        .await
        .expect("应该命中");
    assert_eq!(record.result, json!({"shape": "oval"}));
    assert_eq!(record.metadata.source_type, "facial");
    assert_eq!(record.metadata.source_hash, "abc123");
    assert_eq!(record.metadata.version, super::CACHE_RECORD_VERSION);

    // 清理
    cache.invalidate_pattern("it_analysis:*").await;
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_ttl_respected() {
    let cache = live_service("ttl");
    cache.initialize().await.unwrap();

    let key = "it_ttl:config:shortlived";
    assert!(cache.set(key, &json!({"v": 1}), Some(1)).await);
    assert!(cache.exists(key).await);

    // TTL=1秒，超过后条目应被后端驱逐
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(!cache.exists(key).await);
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_pattern_invalidation_deletes_exact_prefix() {
    let cache = live_service("inval");
    cache.initialize().await.unwrap();

    // 目标用户的两个键 + id前缀相同的另一用户 + 无关用户
    assert!(cache.set("it_inval:user:42:profile", &json!(1), Some(60)).await);
    assert!(cache.set("it_inval:user:42:stats", &json!(2), Some(60)).await);
    assert!(cache.set("it_inval:user:420:profile", &json!(3), Some(60)).await);
    assert!(cache.set("it_inval:user:7:profile", &json!(4), Some(60)).await);

    let deleted = cache.invalidate_pattern("it_inval:user:42:*").await;
    assert_eq!(deleted, 2);

    // id以42开头的其它用户和无关用户的键都不受影响
    assert!(cache.exists("it_inval:user:420:profile").await);
    assert!(cache.exists("it_inval:user:7:profile").await);
    cache.invalidate_pattern("it_inval:*").await;
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_invalidate_user_spans_namespaces() {
    let cache = live_service("userinv");
    cache.initialize().await.unwrap();

    let styling = json!({"step": 2});
    assert!(cache.set_session_cache("42", "styling", &styling).await);
    assert!(cache.set("it_userinv:user:42:profile", &json!({}), Some(60)).await);
    assert!(cache.set("it_userinv:user:42", &json!({}), Some(60)).await);
    // id前缀相同的另一用户
    assert!(cache.set("it_userinv:user:420:profile", &json!({}), Some(60)).await);

    let deleted = cache.invalidate_user("42").await;
    assert_eq!(deleted, 3);
    assert!(cache.get_session_cache("42", "styling").await.is_none());
    assert!(cache.exists("it_userinv:user:420:profile").await);
    cache.invalidate_pattern("it_userinv:*").await;
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_get_or_compute_hits_on_second_call() {
    let cache = live_service("memo");
    cache.initialize().await.unwrap();

    let key = "it_memo:analysis:memo:expensive:h1";
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let result: Result<serde_json::Value, std::convert::Infallible> = cache
            .get_or_compute(key, Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"palette": "autumn"}))
            })
            .await;
        assert_eq!(result.unwrap(), json!({"palette": "autumn"}));
    }

    // 第一次miss计算，之后命中
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    cache.invalidate_pattern("it_memo:*").await;
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_compressed_roundtrip_through_backend() {
    let cache = live_service("compress");
    cache.initialize().await.unwrap();

    // 大载荷触发压缩
    let value = json!({"description": "羊毛大衣 ".repeat(512)});
    let key = "it_compress:config:bigvalue";
    assert!(cache.set(key, &value, Some(60)).await);

    let read: serde_json::Value = cache.get(key).await.expect("应该命中");
    assert_eq!(read, value);
    cache.invalidate_pattern("it_compress:*").await;
}

#[tokio::test]
#[ignore] // 需要Redis实例才能运行
async fn test_metrics_track_hit_and_miss() {
    let cache = live_service("metrics");
    cache.initialize().await.unwrap();
    cache.reset_metrics();

    let key = "it_metrics:config:sample";
    let _: Option<serde_json::Value> = cache.get(key).await; // miss
    assert!(cache.set(key, &json!({"a": 1}), Some(60)).await);
    let _: Option<serde_json::Value> = cache.get(key).await; // hit

    let snapshot = cache.metrics_snapshot();
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.hits, 1);
    assert_eq!(snapshot.sets, 1);
    assert!((snapshot.hit_rate - 0.5).abs() < f64::EPSILON);
    cache.invalidate_pattern("it_metrics:*").await;
}
