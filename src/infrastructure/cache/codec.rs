//! 缓存编解码器
//!
//! 先序列化再按配置压缩，算法标识写入信封；
//! 解码以信封自带的算法为准，失败统一归为数据损坏（调用方按miss处理）

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::infrastructure::config::CompressionConfig;

use super::{CacheEnvelope, CacheError, CompressionAlgorithm, SerializationFormat};

/// 缓存值编解码器
#[derive(Debug, Clone)]
pub struct Codec {
    format: SerializationFormat,
    compression: CompressionConfig,
}

impl Codec {
    pub fn new(format: SerializationFormat, compression: CompressionConfig) -> Self {
        Self { format, compression }
    }

    /// 编码值为自描述信封
    pub fn encode<T>(&self, value: &T) -> Result<CacheEnvelope, CacheError>
    where
        T: Serialize,
    {
        let serialized = match self.format {
            SerializationFormat::Json => serde_json::to_vec(value)?,
        };

        let should_compress = self.compression.enabled
            && self.compression.algorithm != CompressionAlgorithm::None
            && serialized.len() >= self.compression.min_bytes;

        if should_compress {
            let compressed = compress(
                self.compression.algorithm,
                self.compression.level,
                &serialized,
            )?;
            Ok(CacheEnvelope::new(
                &compressed,
                true,
                self.compression.algorithm,
                self.format,
            ))
        } else {
            Ok(CacheEnvelope::new(
                &serialized,
                false,
                CompressionAlgorithm::None,
                self.format,
            ))
        }
    }

    /// 从信封解码值
    ///
    /// 解压算法取自信封本身，与当前配置无关
    pub fn decode<T>(&self, envelope: &CacheEnvelope) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        let raw = envelope.payload_bytes()?;

        let bytes = if envelope.compressed {
            decompress(envelope.algorithm, &raw)?
        } else {
            raw
        };

        match envelope.format {
            SerializationFormat::Json => serde_json::from_slice(&bytes)
                .map_err(|e| CacheError::Corruption(format!("反序列化失败: {}", e))),
        }
    }
}

fn compress(
    algorithm: CompressionAlgorithm,
    level: i32,
    bytes: &[u8],
) -> Result<Vec<u8>, CacheError> {
    match algorithm {
        CompressionAlgorithm::None => Ok(bytes.to_vec()),
        CompressionAlgorithm::Zstd => zstd::encode_all(bytes, level)
            .map_err(|e| CacheError::Corruption(format!("zstd压缩失败: {}", e))),
        CompressionAlgorithm::Gzip => {
            // flate2等级范围0-9
            let level = level.clamp(0, 9) as u32;
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(bytes)
                .and_then(|_| encoder.finish())
                .map_err(|e| CacheError::Corruption(format!("gzip压缩失败: {}", e)))
        }
    }
}

fn decompress(algorithm: CompressionAlgorithm, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    match algorithm {
        CompressionAlgorithm::None => Ok(bytes.to_vec()),
        CompressionAlgorithm::Zstd => zstd::decode_all(bytes)
            .map_err(|e| CacheError::Corruption(format!("zstd解压失败: {}", e))),
        CompressionAlgorithm::Gzip => {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map(|_| out)
                .map_err(|e| CacheError::Corruption(format!("gzip解压失败: {}", e)))
        }
    }
}
