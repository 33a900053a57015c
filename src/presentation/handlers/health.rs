//! 健康检查处理器
//!
//! 基础存活检查和缓存后端健康检查

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::{info, instrument};

use crate::infrastructure::cache::CacheHealth;
use crate::presentation::routes::AppState;
use crate::shared::AppResult;

/// 缓存健康检查响应
#[derive(Debug, Serialize)]
pub struct CacheHealthResponse {
    pub service: String,
    pub version: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub cache: CacheHealth,
}

/// 基础健康检查
#[instrument]
pub async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    info!("🏥 基础健康检查请求");

    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "wardrobe-cache-rust",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// 缓存后端健康检查（含指标快照）
#[instrument(skip(state))]
pub async fn get_cache_health(
    State(state): State<AppState>,
) -> AppResult<Json<CacheHealthResponse>> {
    info!("🏥 缓存健康检查请求");

    let cache = state.cache.health_check().await;

    Ok(Json(CacheHealthResponse {
        service: "wardrobe-cache-rust".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        cache,
    }))
}
