//! 基础设施层模块
//!
//! 负责缓存子系统和配置管理等基础设施相关功能

pub mod cache;
pub mod config;

// 重新导出常用类型
pub use config::Config;
pub use cache::{CacheError, CacheService, SharedCacheService};
