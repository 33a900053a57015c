//! Wardrobe Cache Rust 服务主入口
//!
//! AI衣橱助手的Redis缓存子系统，提供缓存管理API

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wardrobe_cache_rust::{create_routes, AppState, CacheService, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志 - 默认INFO等级，便于生产环境使用
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wardrobe_cache_rust=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载环境变量
    dotenv::dotenv().ok();

    info!("🚀 启动 Wardrobe Cache Rust 服务");

    // 加载配置
    let config = Arc::new(Config::load()?);
    info!("✅ 配置加载成功");

    // 初始化缓存服务。后端不可达时降级运行而非退出，
    // 业务路径在降级模式下全部走miss
    let cache = Arc::new(CacheService::new(config.cache.clone()));
    match cache.initialize().await {
        Ok(()) => {
            if config.cache.enabled {
                info!("✅ 缓存后端连接成功");
            } else {
                info!("⚠️ 缓存已在配置中禁用，以降级模式运行");
            }
        }
        Err(e) => {
            warn!("⚠️ 缓存后端连接失败，以降级模式运行: {}", e);
        }
    }

    // 创建路由
    let state = AppState {
        cache: cache.clone(),
        config: config.clone(),
    };
    let app = create_routes(state);
    info!("✅ 路由创建成功");

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 服务器启动成功，监听地址: {} (HTTP/1.1)", addr);
    info!(
        "📖 健康检查: http://localhost:{}/health",
        config.server.port
    );

    let shutdown_cache = cache.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 接收到关闭信号，正在优雅关闭服务器...");
            shutdown_cache.close().await;
        })
        .await?;

    Ok(())
}
