use crate::modules::cache::domain::CacheBackend;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared network cache tier backed by Redis
pub struct RedisCache {
    client: Arc<Client>,
    connection: Mutex<Option<MultiplexedConnection>>,
    op_timeout: Duration,
}

impl RedisCache {
    /// Parse the URL; no connection is made until the first operation
    pub fn new(redis_url: &str, op_timeout: Duration) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::CacheError(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            connection: Mutex::new(None),
            op_timeout,
        })
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| AppError::CacheError("Redis connection timed out".to_string()))?
        .map_err(|e| AppError::CacheError(format!("Redis connection failed: {}", e)))?;

        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects
    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    async fn run<T, F, Fut>(&self, op: &str, f: F) -> AppResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        let result = match tokio::time::timeout(self.op_timeout, f(conn)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => AppError::from(e),
            Err(_) => AppError::CacheError(format!("Redis {} timed out", op)),
        };
        self.reset_connection().await;
        Err(result)
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let key = key.to_string();
        self.run("GET", |mut conn| async move {
            // Be explicit about the expected return type from Redis
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let key = key.to_string();
        // SETEX has second granularity and rejects zero
        let seconds = ttl.as_secs().max(1);
        self.run("SETEX", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, seconds).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let key = key.to_string();
        self.run("DEL", |mut conn| async move {
            // `DEL` returns the deleted count, which we don't need
            conn.del::<_, ()>(key).await
        })
        .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
