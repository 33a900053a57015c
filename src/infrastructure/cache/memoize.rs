//! 异步计算的显式记忆化包装
//!
//! 以函数标识 + 参数稳定哈希为键包装任意异步计算。
//! 刻意做成调用方显式调用的高阶函数而非注解魔法，
//! 缓存契约在调用点可见

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::{CacheNamespace, CacheService, KeyBuilder};

/// 包装异步计算，结果按 函数名+参数哈希 记忆化
///
/// 参数无法序列化时绕过缓存直接计算（fail-open）
pub async fn memoize<A, T, E, F, Fut>(
    cache: &CacheService,
    namespace: CacheNamespace,
    fn_name: &str,
    args: &A,
    ttl_seconds: Option<u64>,
    compute: F,
) -> Result<T, E>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let args_value = match serde_json::to_value(args) {
        Ok(value) => value,
        Err(e) => {
            warn!("记忆化参数序列化失败，绕过缓存: fn={}, error={}", fn_name, e);
            return compute().await;
        }
    };

    let args_hash = KeyBuilder::stable_hash(&args_value);
    let fn_name = KeyBuilder::sanitize(fn_name);
    let key = format!(
        "{}{}:memo:{}:{}",
        cache.key_builder().prefix(),
        namespace.as_str(),
        fn_name,
        args_hash
    );

    cache.get_or_compute(&key, ttl_seconds, compute).await
}
