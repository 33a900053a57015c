//! 缓存服务
//!
//! 组合存储、编解码器、键构建器与指标记录器，
//! 暴露应用其余部分消费的通用缓存契约和类别助手。
//!
//! Fail-open设计：缓存是正确性数据源（关系库/AI提供方）之上的
//! 性能优化层，任何缓存故障都降级为"做昂贵的事"而非让请求失败；
//! 故障只通过指标和日志可见

use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::infrastructure::config::CacheConfig;

use super::{
    CacheEnvelope, CacheError, CacheNamespace, CacheRecord, CacheStore, Codec, KeyBuilder,
    MetricsRecorder, MetricsSnapshot,
};

/// 管理统计扫描的键数上限
const ANALYSIS_STATS_SCAN_LIMIT: usize = 1000;

/// 缓存健康检查响应
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: String,
    pub response_time_ms: u64,
    pub reason: Option<String>,
    pub metrics: MetricsSnapshot,
}

/// 预热条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupEntry {
    pub config_type: String,
    pub identifier: Option<String>,
    pub value: Value,
    pub ttl_seconds: Option<u64>,
}

/// 按分析类型聚合的缓存统计
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisCacheStats {
    pub total_entries: usize,
    /// 实际扫描的键数（受上限约束）
    pub scanned: usize,
    pub types: HashMap<String, AnalysisTypeStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisTypeStats {
    pub entries: u64,
    pub estimated_bytes: u64,
    pub ttl_histogram: TtlHistogram,
}

/// TTL分布直方图（秒桶）
#[derive(Debug, Clone, Default, Serialize)]
pub struct TtlHistogram {
    pub no_expiry: u64,
    pub under_hour: u64,
    pub under_day: u64,
    pub over_day: u64,
}

impl TtlHistogram {
    fn record(&mut self, ttl: i64) {
        match ttl {
            -1 => self.no_expiry += 1,
            t if t < 3600 => self.under_hour += 1,
            t if t < 86_400 => self.under_day += 1,
            _ => self.over_day += 1,
        }
    }
}

/// 应用级缓存服务
pub struct CacheService {
    store: CacheStore,
    codec: Codec,
    keys: KeyBuilder,
    metrics: MetricsRecorder,
    config: CacheConfig,
}

impl CacheService {
    /// 显式构造，实例通过依赖注入传递，生命周期为
    /// 启动时initialize、关闭时close（无导入时副作用）
    pub fn new(config: CacheConfig) -> Self {
        let codec = Codec::new(config.serialization_format, config.compression.clone());
        let keys = KeyBuilder::new(&config.key_prefix);
        let metrics = MetricsRecorder::new(config.metrics_enabled);
        let store = CacheStore::new(config.clone());
        Self {
            store,
            codec,
            keys,
            metrics,
            config,
        }
    }

    pub async fn initialize(&self) -> Result<(), CacheError> {
        self.store.initialize().await
    }

    pub async fn reconnect(&self) -> Result<(), CacheError> {
        self.store.reconnect().await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 读取缓存值
    ///
    /// 存储miss或禁用按miss记录；解码失败按error记录（配置不匹配或
    /// 数据损坏，值得告警，与普通不可用区分开）。本调用绝不向外抛错
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let result = match self.store.get(key).await {
            Ok(Some(raw)) => {
                let decoded = serde_json::from_str::<CacheEnvelope>(&raw)
                    .map_err(|e| CacheError::Corruption(format!("信封解析失败: {}", e)))
                    .and_then(|envelope| self.codec.decode::<T>(&envelope));
                match decoded {
                    Ok(value) => {
                        self.metrics.record_hit();
                        debug!("缓存命中: key={}", key);
                        Some(value)
                    }
                    Err(e) => {
                        error!("缓存数据损坏，按miss处理: key={}, error={}", key, e);
                        self.metrics.record_error();
                        None
                    }
                }
            }
            Ok(None) => {
                self.metrics.record_miss();
                debug!("缓存未命中: key={}", key);
                None
            }
            Err(e) => {
                warn!("缓存读取失败，按miss降级: key={}, error={}", key, e);
                self.metrics.record_error();
                None
            }
        };
        self.metrics
            .record_duration(started.elapsed().as_millis() as u64);
        result
    }

    /// 读取缓存值，miss时返回调用方提供的默认值
    pub async fn get_or<T>(&self, key: &str, default: T) -> T
    where
        T: DeserializeOwned,
    {
        self.get(key).await.unwrap_or(default)
    }

    /// 写入缓存值
    ///
    /// 存储禁用或写入失败时返回false而非异常
    pub async fn set<T>(&self, key: &str, value: &T, ttl_seconds: Option<u64>) -> bool
    where
        T: Serialize,
    {
        let encoded = self
            .codec
            .encode(value)
            .and_then(|envelope| serde_json::to_string(&envelope).map_err(CacheError::from));

        let raw = match encoded {
            Ok(raw) => raw,
            Err(e) => {
                error!("缓存编码失败: key={}, error={}", key, e);
                self.metrics.record_error();
                return false;
            }
        };

        match self.store.set(key, &raw, ttl_seconds).await {
            Ok(true) => {
                self.metrics.record_set();
                debug!("缓存写入: key={}, ttl={:?}", key, ttl_seconds);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("缓存写入失败: key={}, error={}", key, e);
                self.metrics.record_error();
                false
            }
        }
    }

    /// 删除缓存键
    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(true) => {
                self.metrics.record_delete();
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("缓存删除失败: key={}, error={}", key, e);
                self.metrics.record_error();
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("缓存EXISTS失败: key={}, error={}", key, e);
                self.metrics.record_error();
                false
            }
        }
    }

    /// 键的剩余TTL，-1无过期，-2不存在（错误按不存在降级）
    pub async fn ttl(&self, key: &str) -> i64 {
        match self.store.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!("缓存TTL查询失败: key={}, error={}", key, e);
                self.metrics.record_error();
                -2
            }
        }
    }

    /// 按模式批量失效，返回实际删除数
    ///
    /// 过宽模式的防护在调用边界（管理HTTP层），本方法执行给定的任何模式
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys = match self.store.keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("模式匹配失败: pattern={}, error={}", pattern, e);
                self.metrics.record_error();
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        match self.store.delete_many(&keys).await {
            Ok(deleted) => {
                self.metrics.record_deletes(deleted as u64);
                info!("模式失效完成: pattern={}, deleted={}", pattern, deleted);
                deleted
            }
            Err(e) => {
                warn!("批量删除失败: pattern={}, error={}", pattern, e);
                self.metrics.record_error();
                0
            }
        }
    }

    /// 按模式列出键（管理接口用，截断到limit）
    pub async fn keys_matching(&self, pattern: &str, limit: usize) -> Vec<String> {
        match self.store.keys_matching(pattern).await {
            Ok(mut keys) => {
                keys.truncate(limit);
                keys
            }
            Err(e) => {
                warn!("键列表查询失败: pattern={}, error={}", pattern, e);
                self.metrics.record_error();
                Vec::new()
            }
        }
    }

    /// 记忆化原语：命中返回缓存值，miss时执行计算、写入并返回。
    ///
    /// 基线设计不做single-flight去重，并发的相同miss会各自计算；
    /// 缓存条目总能从正确性数据源重新推导，last-write-wins可接受
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: Option<u64>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = compute().await?;
        self.set(key, &value, ttl_seconds).await;
        Ok(value)
    }

    // ===== 类别助手 =====

    /// 读取AI分析结果缓存
    pub async fn get_analysis_cache(
        &self,
        content_hash: &str,
        analysis_type: &str,
    ) -> Option<CacheRecord> {
        let key = self.keys.analysis_key(analysis_type, content_hash);
        self.get(&key).await
    }

    /// 写入AI分析结果缓存（昂贵计算，按天TTL）
    pub async fn set_analysis_cache(
        &self,
        content_hash: &str,
        analysis_type: &str,
        result: Value,
    ) -> bool {
        let key = self.keys.analysis_key(analysis_type, content_hash);
        let record = CacheRecord::new(result, analysis_type, content_hash);
        self.set(&key, &record, Some(self.config.ttl.analysis_secs))
            .await
    }

    /// 读取推荐结果缓存，过滤条件规范化哈希后参与键
    pub async fn get_recommendations_cache(
        &self,
        category: &str,
        filters: &Value,
    ) -> Option<CacheRecord> {
        let filters_hash = KeyBuilder::stable_hash(filters);
        let key = self.keys.recommendations_key(category, &filters_hash);
        self.get(&key).await
    }

    pub async fn set_recommendations_cache(
        &self,
        category: &str,
        filters: &Value,
        result: Value,
    ) -> bool {
        let filters_hash = KeyBuilder::stable_hash(filters);
        let key = self.keys.recommendations_key(category, &filters_hash);
        let record = CacheRecord::new(result, category, &filters_hash);
        self.set(&key, &record, Some(self.config.ttl.recommendations_secs))
            .await
    }

    /// 读取会话缓存
    pub async fn get_session_cache(&self, user_id: &str, session_type: &str) -> Option<Value> {
        let key = self.keys.session_key(user_id, session_type);
        self.get(&key).await
    }

    pub async fn set_session_cache(
        &self,
        user_id: &str,
        session_type: &str,
        value: &Value,
    ) -> bool {
        let key = self.keys.session_key(user_id, session_type);
        self.set(&key, value, Some(self.config.ttl.session_secs))
            .await
    }

    /// 读取配置缓存
    pub async fn get_config_cache(
        &self,
        config_type: &str,
        identifier: Option<&str>,
    ) -> Option<Value> {
        let key = self.keys.config_key(config_type, identifier);
        self.get(&key).await
    }

    pub async fn set_config_cache(
        &self,
        config_type: &str,
        identifier: Option<&str>,
        value: &Value,
    ) -> bool {
        let key = self.keys.config_key(config_type, identifier);
        self.set(&key, value, Some(self.config.ttl.config_secs)).await
    }

    /// 失效某用户的全部缓存条目（数据变更时由外部系统触发）
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        let patterns = [
            self.keys.subject_pattern(CacheNamespace::User, user_id),
            self.keys.subject_pattern(CacheNamespace::Session, user_id),
            self.keys.subject_pattern(CacheNamespace::Endpoint, user_id),
        ];

        let mut total = 0;
        for pattern in &patterns {
            total += self.invalidate_pattern(pattern).await;
        }
        // 无后缀的裸用户键不含分段冒号，模式覆盖不到，单独删除
        if self.delete(&self.keys.user_key(user_id, None)).await {
            total += 1;
        }
        info!("用户缓存失效完成: user_id={}, deleted={}", user_id, total);
        total
    }

    /// 预热缓存（写入配置类条目）
    pub async fn warm_up(&self, entries: &[WarmupEntry]) -> usize {
        if !self.config.warmup_enabled {
            info!("缓存预热已在配置中禁用，跳过");
            return 0;
        }

        let mut warmed = 0;
        for entry in entries {
            let key = self
                .keys
                .config_key(&entry.config_type, entry.identifier.as_deref());
            let ttl = entry.ttl_seconds.or(Some(self.config.ttl.config_secs));
            if self.set(&key, &entry.value, ttl).await {
                warmed += 1;
            }
        }
        info!("缓存预热完成: requested={}, warmed={}", entries.len(), warmed);
        warmed
    }

    /// 健康检查：存储ping延迟 + 指标快照
    pub async fn health_check(&self) -> CacheHealth {
        let store_health = self.store.health_check().await;
        CacheHealth {
            status: store_health.status,
            response_time_ms: store_health.response_time_ms,
            reason: store_health.reason,
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("缓存指标已重置");
    }

    /// 按分析类型聚合的缓存统计（条目数、TTL直方图、估算字节数）
    ///
    /// 扫描有界，超出上限的键不计入
    pub async fn analysis_stats(&self) -> AnalysisCacheStats {
        let pattern = self.keys.namespace_pattern(CacheNamespace::Analysis);
        let all_keys = match self.store.keys_matching(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("分析统计扫描失败: error={}", e);
                return AnalysisCacheStats {
                    total_entries: 0,
                    scanned: 0,
                    types: HashMap::new(),
                };
            }
        };

        let total_entries = all_keys.len();
        let mut types: HashMap<String, AnalysisTypeStats> = HashMap::new();
        let analysis_prefix = format!("{}analysis:", self.keys.prefix());

        let mut scanned = 0;
        for key in all_keys.iter().take(ANALYSIS_STATS_SCAN_LIMIT) {
            scanned += 1;
            let analysis_type = key
                .strip_prefix(&analysis_prefix)
                .and_then(|rest| rest.split(':').next())
                .unwrap_or("unknown")
                .to_string();

            let entry = types.entry(analysis_type).or_default();
            entry.entries += 1;

            if let Ok(ttl) = self.store.ttl(key).await {
                entry.ttl_histogram.record(ttl);
            }
            if let Ok(len) = self.store.strlen(key).await {
                entry.estimated_bytes += len;
            }
        }

        AnalysisCacheStats {
            total_entries,
            scanned,
            types,
        }
    }
}
