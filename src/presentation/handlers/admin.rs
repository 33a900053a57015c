//! 缓存管理处理器
//!
//! 键巡检、按模式失效、用户级失效、指标读取/重置、
//! 预热和后端重连的运维接口

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::infrastructure::cache::{AnalysisCacheStats, MetricsSnapshot, WarmupEntry};
use crate::presentation::routes::AppState;
use crate::shared::{AppError, AppResult};

/// 巡检单次返回键数上限
const MAX_KEYS_LIMIT: usize = 1000;
const DEFAULT_KEYS_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub pattern: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    pub pattern: String,
    pub count: usize,
    pub truncated: bool,
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeysQuery {
    pub pattern: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidationResponse {
    pub pattern: String,
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct UserInvalidationResponse {
    pub user_id: String,
    pub deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct WarmupRequest {
    pub entries: Vec<WarmupEntry>,
}

#[derive(Debug, Serialize)]
pub struct WarmupResponse {
    pub enabled: bool,
    pub requested: usize,
    pub warmed: usize,
}

/// 按模式列出缓存键（只读巡检）
#[instrument(skip(state))]
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> AppResult<Json<ListKeysResponse>> {
    let pattern = validate_pattern(&query.pattern)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_KEYS_LIMIT)
        .clamp(1, MAX_KEYS_LIMIT);
    info!("🔍 键巡检: pattern={}, limit={}", pattern, limit);

    let full_pattern = format!("{}{}", state.cache.key_builder().prefix(), pattern);
    let keys = state.cache.keys_matching(&full_pattern, limit + 1).await;
    let truncated = keys.len() > limit;
    let keys: Vec<String> = keys.into_iter().take(limit).collect();

    Ok(Json(ListKeysResponse {
        pattern: full_pattern,
        count: keys.len(),
        truncated,
        keys,
    }))
}

/// 按模式批量删除缓存键
#[instrument(skip(state))]
pub async fn delete_keys(
    State(state): State<AppState>,
    Query(query): Query<DeleteKeysQuery>,
) -> AppResult<Json<InvalidationResponse>> {
    let pattern = validate_pattern(&query.pattern)?;
    let full_pattern = format!("{}{}", state.cache.key_builder().prefix(), pattern);
    info!("🗑️ 按模式失效缓存: pattern={}", full_pattern);

    let deleted = state.cache.invalidate_pattern(&full_pattern).await;
    info!("✅ 缓存失效完成: pattern={}, deleted={}", full_pattern, deleted);

    Ok(Json(InvalidationResponse {
        pattern: full_pattern,
        deleted,
    }))
}

/// 失效单个用户的全部缓存条目
#[instrument(skip(state))]
pub async fn invalidate_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserInvalidationResponse>> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::Validation("用户ID不能为空".to_string()));
    }
    info!("🗑️ 失效用户缓存: user_id={}", user_id);

    let deleted = state.cache.invalidate_user(&user_id).await;

    Ok(Json(UserInvalidationResponse { user_id, deleted }))
}

/// 读取缓存指标快照
#[instrument(skip(state))]
pub async fn get_metrics(State(state): State<AppState>) -> AppResult<Json<MetricsSnapshot>> {
    Ok(Json(state.cache.metrics_snapshot()))
}

/// 重置缓存指标计数器
#[instrument(skip(state))]
pub async fn reset_metrics(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    info!("📊 重置缓存指标");
    state.cache.reset_metrics();
    let snapshot = state.cache.metrics_snapshot();

    Ok(Json(serde_json::json!({
        "status": "ok",
        "reset_at": snapshot.last_reset,
    })))
}

/// 预热配置类缓存
#[instrument(skip(state, request))]
pub async fn warmup(
    State(state): State<AppState>,
    Json(request): Json<WarmupRequest>,
) -> AppResult<Json<WarmupResponse>> {
    let enabled = state.config.cache.warmup_enabled;
    info!("🔥 缓存预热请求: {} 个条目", request.entries.len());

    let warmed = state.cache.warm_up(&request.entries).await;

    Ok(Json(WarmupResponse {
        enabled,
        requested: request.entries.len(),
        warmed,
    }))
}

/// 分析缓存统计（按类型聚合）
#[instrument(skip(state))]
pub async fn get_analysis_stats(
    State(state): State<AppState>,
) -> AppResult<Json<AnalysisCacheStats>> {
    info!("📊 分析缓存统计请求");
    Ok(Json(state.cache.analysis_stats().await))
}

/// 手动触发后端重连
#[instrument(skip(state))]
pub async fn reconnect(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    info!("🔄 手动触发缓存后端重连");

    match state.cache.reconnect().await {
        Ok(()) => Ok(Json(serde_json::json!({
            "status": "connected",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))),
        Err(e) => {
            warn!("缓存后端重连失败: error={}", e);
            Err(AppError::Cache(e))
        }
    }
}

/// 校验失效模式，拒绝裸通配等误删全库的模式
///
/// 模式必须包含命名空间段（至少一个冒号），且不能只由通配符组成
fn validate_pattern(pattern: &str) -> Result<String, AppError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(AppError::Validation("模式不能为空".to_string()));
    }
    if pattern.chars().all(|c| c == '*' || c == '?') {
        return Err(AppError::Validation(
            "模式不能只包含通配符".to_string(),
        ));
    }
    if !pattern.contains(':') {
        return Err(AppError::Validation(
            "模式必须包含命名空间段，例如 user:42:*".to_string(),
        ));
    }
    Ok(pattern.to_string())
}
