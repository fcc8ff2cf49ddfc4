use super::Backend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Redis-backed key-value backend
///
/// Keys are prefixed to isolate namespaces and other Redis data. Entries
/// carry no TTL: user data must outlive any single session.
pub struct RedisBackend {
    client: redis::Client,
    /// Key prefix, including the namespace
    prefix: Vec<u8>,
    closed: AtomicBool,
}

impl RedisBackend {
    /// Create a new Redis backend
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            prefix: prefix.as_bytes().to_vec(),
            closed: AtomicBool::new(false),
        })
    }

    /// Build the full Redis key
    fn build_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    /// Get an async connection
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Backend("redis backend is closed".to_string()));
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Backend(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut conn = self.get_connection().await?;

        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Backend(format!("Redis GET failed: {}", e)))?;

        data.ok_or_else(|| Error::NotFound(String::from_utf8_lossy(key).into_owned()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut conn = self.get_connection().await?;

        redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Backend(format!("Redis SET failed: {}", e)))?;

        debug!(bytes = value.len(), "Entry saved to Redis");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Redis backend closed");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}
