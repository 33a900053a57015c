//! 缓存基础设施模块
//!
//! 实现应用级缓存子系统：
//! - Codec: 序列化 + 可选压缩，自描述信封格式
//! - KeyBuilder: 命名空间化的确定性缓存键构建
//! - MetricsRecorder: 并发安全的操作计数器
//! - CacheStore: Redis后端连接池与原始操作
//! - CacheService: 组合以上组件的fail-open缓存契约

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod codec;
pub mod key_builder;
pub mod memoize;
pub mod metrics;
pub mod service;
pub mod store;

#[cfg(test)]
mod fail_open_tests;
#[cfg(test)]
mod integration_test;

// 重新导出主要类型
pub use codec::Codec;
pub use key_builder::KeyBuilder;
pub use memoize::memoize;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use service::{AnalysisCacheStats, CacheHealth, CacheService, WarmupEntry};
pub use store::{CacheStore, ConnectionState, StoreHealth};

/// 共享的缓存服务句柄
pub type SharedCacheService = Arc<CacheService>;

/// 缓存子系统错误类型
#[derive(Debug, Error)]
pub enum CacheError {
    /// 后端不可用（连接拒绝/超时），上层按miss处理
    #[error("缓存后端错误: {0}")]
    Backend(#[from] redis::RedisError),

    /// 连接池获取失败（含排队等待超时）
    #[error("连接池错误: {0}")]
    Pool(String),

    /// 操作超出读取超时
    #[error("缓存操作超时: {0}")]
    Timeout(String),

    /// 缓存已禁用
    #[error("缓存已禁用: {0}")]
    Disabled(String),

    /// 存储的数据无法解码（解压或反序列化失败），上层按miss处理但按error记录
    #[error("缓存数据损坏: {0}")]
    Corruption(String),

    /// 写入侧序列化失败
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 缓存键命名空间
///
/// 固定枚举集合，按数据类别划分键空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    User,
    Analysis,
    Recommendations,
    Config,
    Session,
    Endpoint,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::User => "user",
            CacheNamespace::Analysis => "analysis",
            CacheNamespace::Recommendations => "recommendations",
            CacheNamespace::Config => "config",
            CacheNamespace::Session => "session",
            CacheNamespace::Endpoint => "endpoint",
        }
    }
}

/// 压缩算法标识
///
/// 写入时嵌入信封，读取时以信封为准而非当前配置，
/// 保证部署中途切换算法不会损坏既有条目的读取
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    /// 快速块压缩
    Zstd,
    /// 更高压缩比的deflate
    Gzip,
}

impl FromStr for CompressionAlgorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "none" => Ok(CompressionAlgorithm::None),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "gzip" => Ok(CompressionAlgorithm::Gzip),
            _ => Err(format!("未知的压缩算法: {}", value)),
        }
    }
}

/// 序列化格式
///
/// JSON是默认且唯一必需的格式，枚举保留替换空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    Json,
}

impl FromStr for SerializationFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            _ => Err(format!("未知的序列化格式: {}", value)),
        }
    }
}

/// 缓存信封
///
/// 写入后端的是信封而非裸值，读取侧据此自描述地判断是否需要解压
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// base64编码的序列化（可能已压缩）字节
    pub payload: String,
    pub compressed: bool,
    pub algorithm: CompressionAlgorithm,
    pub format: SerializationFormat,
    pub created_at: DateTime<Utc>,
}

impl CacheEnvelope {
    pub fn new(
        bytes: &[u8],
        compressed: bool,
        algorithm: CompressionAlgorithm,
        format: SerializationFormat,
    ) -> Self {
        use base64::Engine as _;
        Self {
            payload: base64::engine::general_purpose::STANDARD.encode(bytes),
            compressed,
            algorithm,
            format,
            created_at: Utc::now(),
        }
    }

    /// 解码载荷字节，base64损坏按Corruption处理
    pub fn payload_bytes(&self) -> Result<Vec<u8>, CacheError> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|e| CacheError::Corruption(format!("base64解码失败: {}", e)))
    }
}

/// 缓存记录格式版本号
pub const CACHE_RECORD_VERSION: u32 = 1;

/// 类别缓存记录（分析结果、推荐结果等高层助手使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub result: serde_json::Value,
    pub metadata: CacheRecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecordMetadata {
    pub source_type: String,
    /// 读写两侧用同一算法计算，保证同一输入映射到同一记录
    pub source_hash: String,
    pub cached_at: DateTime<Utc>,
    pub version: u32,
}

impl CacheRecord {
    pub fn new(result: serde_json::Value, source_type: &str, source_hash: &str) -> Self {
        Self {
            result,
            metadata: CacheRecordMetadata {
                source_type: source_type.to_string(),
                source_hash: source_hash.to_string(),
                cached_at: Utc::now(),
                version: CACHE_RECORD_VERSION,
            },
        }
    }
}
