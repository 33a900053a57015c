//! 路由配置模块
//!
//! 组织和配置所有HTTP路由

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::infrastructure::cache::SharedCacheService;
use crate::infrastructure::config::Config;
use crate::presentation::handlers;
use crate::presentation::middleware::with_response_cache;

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCacheService,
    pub config: Arc<Config>,
}

/// 创建应用路由
pub fn create_routes(state: AppState) -> Router {
    // 公开路由
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // 缓存管理路由
    let admin_routes = Router::new()
        .route("/api/cache/health", get(handlers::health::get_cache_health))
        .route("/api/cache/metrics", get(handlers::admin::get_metrics))
        .route(
            "/api/cache/metrics/reset",
            post(handlers::admin::reset_metrics),
        )
        .route("/api/cache/keys", get(handlers::admin::list_keys))
        .route("/api/cache/keys", delete(handlers::admin::delete_keys))
        .route(
            "/api/cache/invalidate/user/:user_id",
            post(handlers::admin::invalidate_user),
        )
        .route("/api/cache/warmup", post(handlers::admin::warmup))
        .route(
            "/api/cache/stats/analysis",
            get(handlers::admin::get_analysis_stats),
        )
        .route("/api/cache/reconnect", post(handlers::admin::reconnect));

    // 响应缓存中间件对规则表之外的路由是透传的，
    // 嵌入业务路由时在此处合并即可获得端点缓存
    let app = Router::new().merge(public_routes).merge(admin_routes);

    with_response_cache(app, state.clone())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
