//! Byte-oriented storage backends
//!
//! Every store in this crate sits on top of a [`Backend`]: a plain
//! `get`/`put`/`close` capability over byte keys. Three implementations are
//! provided and selected at construction time:
//! - SQLite (default, embedded, persists across restarts)
//! - Redis (shared state for several service instances)
//! - In-memory (development/testing)
//!
//! A backend instance is bound to a namespace, so the session state and the
//! user data may share one physical database without key collisions.

mod memory;
mod redis_store;
mod sqlite;

pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;
pub use sqlite::SqliteBackend;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Namespace holding interpreter state, keyed by session id
pub const STATE_NAMESPACE: &str = "state";

/// Namespace holding keyed user data and indexed lists
pub const USERDATA_NAMESPACE: &str = "userdata";

/// Generic byte-oriented key-value backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the key is absent and
    /// [`Error::Backend`] on any I/O or connectivity failure.
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Create or overwrite the value stored under `key`
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Release connections. Further calls fail.
    async fn close(&self) -> Result<()>;

    /// Short backend name for logs
    fn kind(&self) -> &'static str;
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend type: "sqlite" (default), "redis", or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Data directory; defaults to ~/.ussd
    #[serde(default)]
    pub data_dir: Option<String>,

    /// SQLite database file, relative to the data directory
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Redis URL (only used when backend = "redis")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Redis key prefix
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    /// How long a request waits for a busy session before failing.
    /// 0 waits indefinitely.
    #[serde(default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "ussd.db".to_string()
}

fn default_redis_prefix() -> String {
    "ussd:".to_string()
}

fn default_lease_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: None,
            sqlite_path: default_sqlite_path(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            lease_timeout_ms: default_lease_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Resolve the data directory
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => dirs::home_dir()
                .map(|home| home.join(".ussd"))
                .ok_or_else(|| Error::Configuration("could not determine home directory".to_string())),
        }
    }

    /// Lease wait bound, `None` meaning no bound
    #[must_use]
    pub fn lease_timeout(&self) -> Option<std::time::Duration> {
        (self.lease_timeout_ms > 0).then(|| std::time::Duration::from_millis(self.lease_timeout_ms))
    }
}

/// The two backend handles the service runs on
#[derive(Clone)]
pub struct Backends {
    /// Durable interpreter state
    pub state: Arc<dyn Backend>,
    /// Keyed user data and indexed lists
    pub userdata: Arc<dyn Backend>,
}

impl Backends {
    /// Open both backends from configuration
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let backends = match config.backend.as_str() {
            "sqlite" => {
                let path = config.data_dir()?.join(&config.sqlite_path);
                let state = SqliteBackend::open(&path, STATE_NAMESPACE).await?;
                let userdata = state.with_namespace(USERDATA_NAMESPACE);
                Self {
                    state: Arc::new(state),
                    userdata: Arc::new(userdata),
                }
            }
            "redis" => {
                let url = config.redis_url.as_deref().unwrap_or("redis://localhost:6379");
                let state = RedisBackend::new(url, &format!("{}{}:", config.redis_prefix, STATE_NAMESPACE))?;
                let userdata =
                    RedisBackend::new(url, &format!("{}{}:", config.redis_prefix, USERDATA_NAMESPACE))?;
                Self {
                    state: Arc::new(state),
                    userdata: Arc::new(userdata),
                }
            }
            "memory" => Self::memory(),
            other => {
                return Err(Error::Configuration(format!(
                    "Unknown storage backend: '{}'. Use 'sqlite', 'redis', or 'memory'.",
                    other
                )))
            }
        };

        info!(backend = %config.backend, "Storage backends opened");
        Ok(backends)
    }

    /// Fresh in-memory backends
    #[must_use]
    pub fn memory() -> Self {
        Self {
            state: Arc::new(MemoryBackend::new()),
            userdata: Arc::new(MemoryBackend::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.lease_timeout(), Some(std::time::Duration::from_millis(5000)));
    }

    #[test]
    fn test_zero_lease_timeout_waits_forever() {
        let config = StorageConfig {
            lease_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.lease_timeout(), None);
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let config = StorageConfig {
            backend: "gdbm".to_string(),
            ..Default::default()
        };
        let result = Backends::from_config(&config).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_sqlite_backends_share_file_not_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: Some(temp.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        let backends = Backends::from_config(&config).await.unwrap();

        backends.state.put(b"254700000000", b"state").await.unwrap();
        assert!(backends.userdata.get(b"254700000000").await.unwrap_err().is_not_found());
        assert_eq!(backends.state.get(b"254700000000").await.unwrap(), b"state");
    }
}
