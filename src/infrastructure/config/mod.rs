//! 配置管理模块
//!
//! 从环境变量加载服务配置，包括缓存后端连接、TTL策略、
//! 压缩选项和端点响应缓存规则

use serde::{Deserialize, Serialize};
use std::env;

use crate::infrastructure::cache::{CompressionAlgorithm, SerializationFormat};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// 缓存子系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 后端总开关，关闭后所有操作直接降级为miss/no-op
    pub enabled: bool,
    pub redis_url: String,
    /// 全局键前缀，所有命名空间都在其下
    pub key_prefix: String,
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// 池满时的排队等待超时，超时后快速失败（上层视为miss）
    pub wait_timeout_ms: u64,
    pub compression: CompressionConfig,
    pub serialization_format: SerializationFormat,
    pub ttl: TtlConfig,
    pub metrics_enabled: bool,
    pub warmup_enabled: bool,
    /// 端点响应缓存规则表，启动时加载一次
    pub endpoint_rules: Vec<EndpointCacheRule>,
}

/// 压缩配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub algorithm: CompressionAlgorithm,
    pub level: i32,
    /// 小于该字节数的载荷不压缩
    pub min_bytes: usize,
}

/// 各类别TTL策略（秒）
///
/// AI分析结果昂贵，按天缓存；会话按小时；端点响应按分钟
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub default_secs: u64,
    pub analysis_secs: u64,
    pub session_secs: u64,
    pub recommendations_secs: u64,
    pub config_secs: u64,
    pub analytics_secs: u64,
}

/// 端点响应缓存规则
///
/// 不可变配置，启动时加载一次，中间件按路径匹配查找
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCacheRule {
    /// 路由模式，支持精确匹配或以`*`结尾的前缀匹配
    pub route_pattern: String,
    pub ttl_seconds: u64,
    /// 是否将调用方身份纳入缓存键
    pub vary_by_caller: bool,
    pub admin_only: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // 从环境变量加载配置
        dotenv::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "9630".to_string())
                    .parse()
                    .unwrap_or(9630),
                host: env::var("HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            cache: CacheConfig::load_default(),
        };

        Ok(config)
    }
}

impl CacheConfig {
    /// 加载默认的缓存配置（从环境变量）
    pub fn load_default() -> Self {
        Self {
            enabled: env::var("CACHE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            key_prefix: env::var("CACHE_PREFIX")
                .unwrap_or_else(|_| "wardrobe:".to_string()),
            pool_size: env::var("CACHE_POOL_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            connect_timeout_ms: env::var("CACHE_CONNECT_TIMEOUT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            read_timeout_ms: env::var("CACHE_READ_TIMEOUT_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            wait_timeout_ms: env::var("CACHE_WAIT_TIMEOUT_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            compression: CompressionConfig::load_default(),
            serialization_format: env::var("CACHE_SERIALIZATION_FORMAT")
                .unwrap_or_else(|_| "json".to_string())
                .parse()
                .unwrap_or(SerializationFormat::Json),
            ttl: TtlConfig::load_default(),
            metrics_enabled: env::var("CACHE_METRICS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            warmup_enabled: env::var("CACHE_WARMUP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            endpoint_rules: default_endpoint_rules(),
        }
    }
}

impl CompressionConfig {
    pub fn load_default() -> Self {
        Self {
            enabled: env::var("CACHE_COMPRESSION_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            algorithm: env::var("CACHE_COMPRESSION_ALGORITHM")
                .unwrap_or_else(|_| "zstd".to_string())
                .parse()
                .unwrap_or(CompressionAlgorithm::Zstd),
            level: env::var("CACHE_COMPRESSION_LEVEL")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            min_bytes: env::var("CACHE_COMPRESSION_MIN_BYTES")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
        }
    }
}

impl TtlConfig {
    pub fn load_default() -> Self {
        Self {
            default_secs: env::var("CACHE_TTL_DEFAULT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            // AI分析结果按7天缓存
            analysis_secs: env::var("CACHE_TTL_ANALYSIS")
                .unwrap_or_else(|_| "604800".to_string())
                .parse()
                .unwrap_or(604_800),
            // 会话数据按6小时缓存
            session_secs: env::var("CACHE_TTL_SESSION")
                .unwrap_or_else(|_| "21600".to_string())
                .parse()
                .unwrap_or(21_600),
            recommendations_secs: env::var("CACHE_TTL_RECOMMENDATIONS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            config_secs: env::var("CACHE_TTL_CONFIG")
                .unwrap_or_else(|_| "43200".to_string())
                .parse()
                .unwrap_or(43_200),
            analytics_secs: env::var("CACHE_TTL_ANALYTICS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .unwrap_or(900),
        }
    }
}

/// 默认端点响应缓存规则表
pub fn default_endpoint_rules() -> Vec<EndpointCacheRule> {
    vec![
        EndpointCacheRule {
            route_pattern: "/api/recommendations".to_string(),
            ttl_seconds: 300,
            vary_by_caller: true,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/recommendations/*".to_string(),
            ttl_seconds: 300,
            vary_by_caller: true,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/wardrobe/items".to_string(),
            ttl_seconds: 120,
            vary_by_caller: true,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/outfits/suggestions".to_string(),
            ttl_seconds: 300,
            vary_by_caller: true,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/config/styles".to_string(),
            ttl_seconds: 3600,
            vary_by_caller: false,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/analysis/types".to_string(),
            ttl_seconds: 3600,
            vary_by_caller: false,
            admin_only: false,
        },
        EndpointCacheRule {
            route_pattern: "/api/admin/usage-summary".to_string(),
            ttl_seconds: 60,
            vary_by_caller: false,
            admin_only: true,
        },
    ]
}
