//! Redis cache store

use super::CacheSink;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Keys deleted per DEL command during pattern eviction
const DELETE_BATCH: usize = 500;

/// Redis-backed cache store
///
/// The multiplexed connection is opened on first use and shared by every
/// caller afterwards, so a Redis outage at startup only costs cache misses.
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisCache {
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Cache(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                tracing::info!("Connecting to Redis cache");
                self.client.get_multiplexed_async_connection().await
            })
            .await
            .map_err(redis_error)?;

        Ok(conn.clone())
    }
}

fn redis_error(e: redis::RedisError) -> AppError {
    AppError::Cache(e.to_string())
}

#[async_trait]
impl CacheSink for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(redis_error)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(redis_error)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.connection().await?;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(pattern)
                .await
                .map_err(redis_error)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut removed = 0u64;
        for batch in keys.chunks(DELETE_BATCH) {
            let count: u64 = conn.del(batch).await.map_err(redis_error)?;
            removed += count;
        }

        Ok(removed)
    }
}
