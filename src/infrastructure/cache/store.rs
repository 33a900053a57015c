//! Redis缓存存储
//!
//! 持有到远程后端的有界连接池，暴露原始键值操作。
//! 连接状态机：未初始化/禁用 -> initialize/reconnect -> 已连接；
//! 禁用状态下所有操作立即返回absent/no-op，不发起任何网络I/O，
//! 只有显式的reconnect才会离开禁用状态（避免每请求连接风暴）

use std::time::{Duration, Instant};

use deadpool_redis::{Pool, Runtime};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::infrastructure::config::CacheConfig;

use super::CacheError;

/// 连接状态
///
/// 仅在initialize/close/reconnect期间写入，所有操作读取
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connected,
    Disabled { reason: String },
}

/// 存储健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub status: String,
    pub response_time_ms: u64,
    pub reason: Option<String>,
}

/// Redis缓存存储
pub struct CacheStore {
    config: CacheConfig,
    pool: RwLock<Option<Pool>>,
    state: RwLock<ConnectionState>,
}

impl CacheStore {
    /// 创建存储实例，初始为禁用状态，需显式initialize
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disabled {
                reason: "未初始化".to_string(),
            }),
        }
    }

    /// 建立连接池并验证连通性
    ///
    /// 失败时保持禁用状态并返回错误，由调用方决定降级策略
    pub async fn initialize(&self) -> Result<(), CacheError> {
        if !self.config.enabled {
            let mut state = self.state.write().await;
            *state = ConnectionState::Disabled {
                reason: "配置中已禁用".to_string(),
            };
            debug!("缓存后端已在配置中禁用");
            return Ok(());
        }

        let mut pool_config = deadpool_redis::PoolConfig::new(self.config.pool_size);
        pool_config.timeouts.wait = Some(Duration::from_millis(self.config.wait_timeout_ms));
        pool_config.timeouts.create =
            Some(Duration::from_millis(self.config.connect_timeout_ms));

        let mut redis_config = deadpool_redis::Config::from_url(&self.config.redis_url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(format!("连接池创建失败: {}", e)))?;

        // 连通性验证，失败则保持禁用
        match self.ping_via(&pool).await {
            Ok(_) => {
                {
                    let mut pool_guard = self.pool.write().await;
                    *pool_guard = Some(pool);
                }
                {
                    let mut state = self.state.write().await;
                    *state = ConnectionState::Connected;
                }
                info!("缓存后端连接成功: pool_size={}", self.config.pool_size);
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write().await;
                *state = ConnectionState::Disabled {
                    reason: format!("连接验证失败: {}", e),
                };
                Err(e)
            }
        }
    }

    /// 显式重连，这是离开禁用状态的唯一途径
    pub async fn reconnect(&self) -> Result<(), CacheError> {
        info!("缓存后端显式重连");
        self.initialize().await
    }

    /// 关闭存储，进入禁用状态
    pub async fn close(&self) {
        {
            let mut pool_guard = self.pool.write().await;
            *pool_guard = None;
        }
        let mut state = self.state.write().await;
        *state = ConnectionState::Disabled {
            reason: "已关闭".to_string(),
        };
        info!("缓存后端已关闭");
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        let pool_guard = self.pool.read().await;
        let pool = pool_guard
            .as_ref()
            .ok_or_else(|| CacheError::Disabled("连接池不存在".to_string()))?;
        // 池满时排队等待，超出wait超时后快速失败
        pool.get()
            .await
            .map_err(|e| CacheError::Pool(format!("获取连接失败: {}", e)))
    }

    async fn ping_via(&self, pool: &Pool) -> Result<(), CacheError> {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| CacheError::Pool(format!("获取连接失败: {}", e)))?;
        self.with_read_timeout(redis::cmd("PING").query_async::<_, ()>(&mut conn))
            .await?;
        Ok(())
    }

    /// 所有后端读写都带显式读取超时，慢后端只拖慢缓存路径而非整个请求管线
    async fn with_read_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(Duration::from_millis(self.config.read_timeout_ms), fut)
            .await
            .map_err(|_| {
                CacheError::Timeout(format!("读取超时({}ms)", self.config.read_timeout_ms))
            })?
            .map_err(CacheError::Backend)
    }

    /// 获取原始值，禁用状态下立即返回None
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if !self.is_connected().await {
            return Ok(None);
        }
        let mut conn = self.conn().await?;
        let value = self
            .with_read_timeout(
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<_, Option<String>>(&mut conn),
            )
            .await?;
        debug!("存储GET: key={}, hit={}", key, value.is_some());
        Ok(value)
    }

    /// 写入原始值
    ///
    /// ttl为None时不设过期（慎用，类别助手总是提供TTL）
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, CacheError> {
        if !self.is_connected().await {
            return Ok(false);
        }
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => {
                self.with_read_timeout(
                    redis::cmd("SETEX")
                        .arg(key)
                        .arg(ttl)
                        .arg(value)
                        .query_async::<_, ()>(&mut conn),
                )
                .await?;
            }
            None => {
                self.with_read_timeout(
                    redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .query_async::<_, ()>(&mut conn),
                )
                .await?;
            }
        }
        debug!("存储SET: key={}, ttl={:?}", key, ttl_seconds);
        Ok(true)
    }

    /// 删除键，返回是否实际删除
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if !self.is_connected().await {
            return Ok(false);
        }
        let mut conn = self.conn().await?;
        let deleted = self
            .with_read_timeout(
                redis::cmd("DEL")
                    .arg(key)
                    .query_async::<_, i64>(&mut conn),
            )
            .await?;
        debug!("存储DEL: key={}, deleted={}", key, deleted > 0);
        Ok(deleted > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if !self.is_connected().await {
            return Ok(false);
        }
        let mut conn = self.conn().await?;
        let exists = self
            .with_read_timeout(
                redis::cmd("EXISTS")
                    .arg(key)
                    .query_async::<_, i64>(&mut conn),
            )
            .await?;
        Ok(exists > 0)
    }

    /// 查询键的剩余TTL（秒）
    ///
    /// 遵循后端约定：-1 = 无过期，-2 = 键不存在。
    /// 禁用状态下按键不存在处理返回-2
    pub async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        if !self.is_connected().await {
            return Ok(-2);
        }
        let mut conn = self.conn().await?;
        let ttl = self
            .with_read_timeout(
                redis::cmd("TTL")
                    .arg(key)
                    .query_async::<_, i64>(&mut conn),
            )
            .await?;
        Ok(ttl)
    }

    /// 按模式列出键
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        if !self.is_connected().await {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let keys = self
            .with_read_timeout(
                redis::cmd("KEYS")
                    .arg(pattern)
                    .query_async::<_, Vec<String>>(&mut conn),
            )
            .await?;
        debug!("存储KEYS: pattern={}, matched={}", pattern, keys.len());
        Ok(keys)
    }

    /// 批量删除，返回实际删除数
    pub async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() || !self.is_connected().await {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let deleted = self
            .with_read_timeout(
                redis::cmd("DEL")
                    .arg(keys)
                    .query_async::<_, i64>(&mut conn),
            )
            .await?;
        info!("存储批量删除: requested={}, deleted={}", keys.len(), deleted);
        Ok(deleted as usize)
    }

    /// 条目字节长度估算（管理统计用）
    pub async fn strlen(&self, key: &str) -> Result<u64, CacheError> {
        if !self.is_connected().await {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let len = self
            .with_read_timeout(
                redis::cmd("STRLEN")
                    .arg(key)
                    .query_async::<_, u64>(&mut conn),
            )
            .await?;
        Ok(len)
    }

    /// 轻量级健康检查（ping往返并计时）
    pub async fn health_check(&self) -> StoreHealth {
        let state = self.state().await;
        if let ConnectionState::Disabled { reason } = state {
            return StoreHealth {
                status: "unhealthy".to_string(),
                response_time_ms: 0,
                reason: Some(reason),
            };
        }

        let started = Instant::now();
        let ping = async {
            let mut conn = self.conn().await?;
            self.with_read_timeout(redis::cmd("PING").query_async::<_, ()>(&mut conn))
                .await
        };

        match ping.await {
            Ok(_) => StoreHealth {
                status: "healthy".to_string(),
                response_time_ms: started.elapsed().as_millis() as u64,
                reason: None,
            },
            Err(e) => {
                warn!("健康检查ping失败: {}", e);
                StoreHealth {
                    status: "unhealthy".to_string(),
                    response_time_ms: started.elapsed().as_millis() as u64,
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}
