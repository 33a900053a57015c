//! HTTP响应缓存中间件
//!
//! 请求状态机：收到请求 -> 查找规则 -> 不可缓存则透传；
//! 可缓存则查缓存 -> 命中原样回放 -> 未命中放行处理器，
//! 成功的JSON响应按规则TTL写入。无论命中与否都打上
//! x-cache观测头。中间件内部错误只记日志，绝不把正常
//! 成功的请求变成错误响应

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infrastructure::cache::KeyBuilder;
use crate::infrastructure::config::EndpointCacheRule;
use crate::presentation::routes::AppState;

/// 缓存响应体的大小上限
const MAX_CACHEABLE_BODY_BYTES: usize = 2 * 1024 * 1024;

/// 调用方身份请求头（由范围外的认证层写入）
const CALLER_HEADER: &str = "x-user-id";
const ROLE_HEADER: &str = "x-user-role";

/// 存入缓存的响应快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// 给任意应用路由套上响应缓存
pub fn with_response_cache(
    router: axum::Router<AppState>,
    state: AppState,
) -> axum::Router<AppState> {
    router.layer(axum::middleware::from_fn_with_state(
        state,
        response_cache_middleware,
    ))
}

/// 响应缓存中间件
pub async fn response_cache_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // 仅安全读方法可缓存
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let Some(rule) = match_rule(&state.config.cache.endpoint_rules, &path) else {
        return next.run(request).await;
    };
    let rule = rule.clone();

    if rule.admin_only && !is_admin(&request) {
        return next.run(request).await;
    }

    let caller = if rule.vary_by_caller {
        caller_identity(&request)
    } else {
        None
    };
    let query = request.uri().query().unwrap_or("").to_string();
    let query_hash = KeyBuilder::stable_hash(&serde_json::Value::String(query));
    let key = state
        .cache
        .key_builder()
        .endpoint_key(caller.as_deref(), &path, &query_hash);

    // 命中：从信封重建响应并打上观测头
    if let Some(cached) = state.cache.get::<CachedResponse>(&key).await {
        let remaining_ttl = state.cache.ttl(&key).await;
        debug!("端点缓存命中: path={}, key={}", path, key);
        return serve_cached(cached, remaining_ttl);
    }

    // 未命中：放行请求正常执行
    let response = next.run(request).await;

    if !response.status().is_success() {
        return annotate(response, "MISS");
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return annotate(response, "MISS");
    }

    // 声明长度超限的响应原样透传，不消费响应体
    let declared_too_large = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len > MAX_CACHEABLE_BODY_BYTES)
        .unwrap_or(false);
    if declared_too_large {
        debug!("响应体超出缓存上限，跳过缓存: path={}", path);
        return annotate(response, "MISS");
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // 底层流中断，响应体已无法恢复
            warn!("响应体读取失败，跳过缓存: path={}, error={}", path, e);
            return annotate(Response::from_parts(parts, Body::empty()), "MISS");
        }
    };

    // 无content-length的流式响应在此兜底：超限只跳过写入，响应体保持完整
    if bytes.len() > MAX_CACHEABLE_BODY_BYTES {
        debug!("响应体超出缓存上限，跳过缓存: path={}, bytes={}", path, bytes.len());
        return annotate(Response::from_parts(parts, Body::from(bytes)), "MISS");
    }

    if let Ok(body_text) = std::str::from_utf8(&bytes) {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let snapshot = CachedResponse {
            status: parts.status.as_u16(),
            content_type,
            body: body_text.to_string(),
        };
        // 写入失败已在服务内降级并记录
        state.cache.set(&key, &snapshot, Some(rule.ttl_seconds)).await;
        debug!("端点响应已缓存: path={}, ttl={}", path, rule.ttl_seconds);
    }

    annotate(
        Response::from_parts(parts, Body::from(bytes)),
        "MISS",
    )
}

/// 按路径查找端点缓存规则（精确匹配或`*`结尾的前缀匹配）
fn match_rule<'a>(rules: &'a [EndpointCacheRule], path: &str) -> Option<&'a EndpointCacheRule> {
    rules.iter().find(|rule| {
        if let Some(prefix) = rule.route_pattern.strip_suffix('*') {
            path.starts_with(prefix)
        } else {
            rule.route_pattern == path
        }
    })
}

fn caller_identity(request: &Request) -> Option<String> {
    request
        .headers()
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn is_admin(request: &Request) -> bool {
    request
        .headers()
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "admin")
        .unwrap_or(false)
}

/// 从缓存快照重建响应
fn serve_cached(cached: CachedResponse, remaining_ttl: i64) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, cached.content_type)
        .header("x-cache", "HIT");
    if remaining_ttl >= 0 {
        builder = builder.header("x-cache-ttl", remaining_ttl.to_string());
    }
    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn annotate(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(status));
    response
}
