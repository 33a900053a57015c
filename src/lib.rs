//! Wardrobe Cache Rust 服务
//!
//! AI衣橱助手的应用级缓存子系统，位于请求处理器与Redis兼容后端之间

// 核心模块
pub mod shared;          // 共享模块（错误处理、类型定义）
pub mod infrastructure;  // 基础设施层（缓存、配置）
pub mod presentation;    // 表示层（HTTP处理、路由、中间件）

// 重新导出核心类型
pub use infrastructure::Config;
pub use infrastructure::cache::{CacheError, CacheService, SharedCacheService};
pub use shared::{AppError, AppResult};
pub use presentation::routes::{create_routes, AppState};
