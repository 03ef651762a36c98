//! Redis-backed session cache

use super::{CacheError, CacheResult, SessionCache, SessionKey};
use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{error, info, warn};

/// Redis connection pool type alias
pub type RedisPool = Pool<RedisConnectionManager>;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Expiry applied to every session entry
    pub ttl: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 4,
            connection_timeout: Duration::from_secs(5),
            ttl: Duration::from_secs(86_400),
        }
    }
}

/// Initialize the Redis pool. A failed PING is logged, not fatal.
pub async fn init_cache_pool(config: &RedisCacheConfig) -> CacheResult<RedisPool> {
    info!(
        max_connections = config.max_connections,
        redis_url = %config.redis_url,
        "Initializing Redis session cache pool"
    );

    let manager = RedisConnectionManager::new(config.redis_url.as_str()).map_err(|e| {
        error!("Failed to create Redis connection manager: {}", e);
        CacheError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| {
            error!("Failed to build Redis connection pool: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

    if let Err(e) = test_connection(&pool).await {
        warn!("Initial Redis connection test failed, but continuing: {}", e);
    }

    Ok(pool)
}

async fn test_connection(pool: &RedisPool) -> CacheResult<()> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}

pub struct RedisCache {
    pool: RedisPool,
    ttl: Duration,
}

impl RedisCache {
    pub fn new(pool: RedisPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub async fn connect(config: &RedisCacheConfig) -> CacheResult<Self> {
        let pool = init_cache_pool(config).await?;
        Ok(Self::new(pool, config.ttl))
    }
}

#[async_trait]
impl SessionCache for RedisCache {
    async fn get_raw(&self, key: SessionKey) -> CacheResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key.to_string()).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: SessionKey, value: String) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn
            .set_ex(key.to_string(), value, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.del(key.to_string()).await?;
        Ok(())
    }
}
