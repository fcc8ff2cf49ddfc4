use super::Backend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory backend (for development/testing)
///
/// Data is lost on restart. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Backend("memory backend is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(key).into_owned()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Memory backend closed");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty().await);

        backend.put(b"k", b"v1").await.unwrap();
        backend.put(b"k", b"v2").await.unwrap();
        assert_eq!(backend.get(b"k").await.unwrap(), b"v2");
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get(b"missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_closed_backend_fails() {
        let backend = MemoryBackend::new();
        backend.put(b"k", b"v").await.unwrap();
        backend.close().await.unwrap();
        backend.close().await.unwrap();

        let err = backend.get(b"k").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
