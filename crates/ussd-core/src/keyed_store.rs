//! Type-tagged per-session user data
//!
//! Every user field lives under a key made of a 2-byte big-endian field tag
//! followed by the session id bytes, so one backend holds all users without
//! collisions and any key can be rebuilt from its two parts.

use crate::backend::Backend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Closed set of user data fields
///
/// Discriminants are part of the storage format: never renumber a variant,
/// only append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum FieldType {
    AccountCreated = 1,
    TrackingId = 2,
    PublicKey = 3,
    CustodialId = 4,
    AccountPin = 5,
    AccountStatus = 6,
    FirstName = 7,
    FamilyName = 8,
    Yob = 9,
    Location = 10,
    Gender = 11,
    Offerings = 12,
    Recipient = 13,
    Amount = 14,
    TemporaryPin = 15,
    ActiveSym = 16,
    ActiveBal = 17,
    ActiveDecimal = 18,
    ActiveAddress = 19,
    TemporarySym = 20,
    TemporaryBal = 21,
    TemporaryDecimal = 22,
    TemporaryAddress = 23,
    PublicKeyReverse = 24,
}

impl FieldType {
    /// Numeric tag used in the packed key
    #[must_use]
    pub fn tag(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pack a field tag and key material into one backend key
#[must_use]
pub fn pack_key(typ: FieldType, data: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + data.len());
    key.extend_from_slice(&typ.tag().to_be_bytes());
    key.extend_from_slice(data);
    key
}

/// Read/write access to a session's user data
#[async_trait]
pub trait UserDataStore: Send + Sync {
    /// Read a field. Absent fields fail with [`Error::NotFound`].
    async fn read_entry(&self, session_id: &str, typ: FieldType) -> Result<Vec<u8>>;

    /// Create or overwrite a field. An empty value clears it.
    async fn write_entry(&self, session_id: &str, typ: FieldType, value: &[u8]) -> Result<()>;
}

/// [`UserDataStore`] over a byte backend
#[derive(Clone)]
pub struct KeyedStore {
    backend: Arc<dyn Backend>,
}

impl KeyedStore {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Underlying backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

#[async_trait]
impl UserDataStore for KeyedStore {
    async fn read_entry(&self, session_id: &str, typ: FieldType) -> Result<Vec<u8>> {
        let key = pack_key(typ, session_id.as_bytes());
        match self.backend.get(&key).await {
            Ok(value) => Ok(value),
            Err(Error::NotFound(_)) => Err(Error::NotFound(format!("{} for session {}", typ, session_id))),
            Err(e) => {
                warn!(session_id = %session_id, field = %typ, error = %e, "Failed to read entry");
                Err(e)
            }
        }
    }

    async fn write_entry(&self, session_id: &str, typ: FieldType, value: &[u8]) -> Result<()> {
        let key = pack_key(typ, session_id.as_bytes());
        self.backend.put(&key, value).await?;
        debug!(session_id = %session_id, field = %typ, bytes = value.len(), "Entry written");
        Ok(())
    }
}

/// Record `session_id` as the owner of `identifier`.
///
/// The reverse entry is keyed by the identifier itself, not by a session,
/// so it is written with the identifier in the session-id slot.
pub async fn register_owner(store: &dyn UserDataStore, identifier: &str, session_id: &str) -> Result<()> {
    store
        .write_entry(identifier, FieldType::PublicKeyReverse, session_id.as_bytes())
        .await
}

/// Session id owning `identifier`, if one was registered
pub async fn lookup_owner(store: &dyn UserDataStore, identifier: &str) -> Result<Option<String>> {
    match store.read_entry(identifier, FieldType::PublicKeyReverse).await {
        Ok(value) => Ok(Some(String::from_utf8_lossy(&value).into_owned())),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> KeyedStore {
        KeyedStore::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_pack_key_layout() {
        let key = pack_key(FieldType::FirstName, b"254712345678");
        assert_eq!(&key[..2], &[0x00, 0x07]);
        assert_eq!(&key[2..], b"254712345678");
        assert_eq!(key, pack_key(FieldType::FirstName, b"254712345678"));
        assert_ne!(key, pack_key(FieldType::FamilyName, b"254712345678"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = store();
        store.write_entry("s1", FieldType::FirstName, b"John").await.unwrap();
        assert_eq!(store.read_entry("s1", FieldType::FirstName).await.unwrap(), b"John");

        store.write_entry("s1", FieldType::FirstName, b"Jane").await.unwrap();
        assert_eq!(store.read_entry("s1", FieldType::FirstName).await.unwrap(), b"Jane");
    }

    #[tokio::test]
    async fn test_unwritten_field_not_found() {
        let store = store();
        store.write_entry("s1", FieldType::FirstName, b"John").await.unwrap();
        let err = store.read_entry("s1", FieldType::Yob).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_sessions_isolated() {
        let store = store();
        store.write_entry("s1", FieldType::AccountPin, b"1234").await.unwrap();
        store.write_entry("s2", FieldType::AccountPin, b"9999").await.unwrap();
        assert_eq!(store.read_entry("s1", FieldType::AccountPin).await.unwrap(), b"1234");
        assert_eq!(store.read_entry("s2", FieldType::AccountPin).await.unwrap(), b"9999");
    }

    #[tokio::test]
    async fn test_cleared_field_is_present_and_empty() {
        let store = store();
        store.write_entry("s1", FieldType::TemporarySym, b"SRF").await.unwrap();
        store.write_entry("s1", FieldType::TemporarySym, b"").await.unwrap();
        assert!(store.read_entry("s1", FieldType::TemporarySym).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_not_found() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KeyedStore::new(backend.clone());
        backend.close().await.unwrap();
        let err = store.read_entry("s1", FieldType::FirstName).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_owner_lookup() {
        let store = store();
        assert_eq!(lookup_owner(&store, "0xabc").await.unwrap(), None);
        register_owner(&store, "0xabc", "254712345678").await.unwrap();
        assert_eq!(lookup_owner(&store, "0xabc").await.unwrap().as_deref(), Some("254712345678"));
    }
}
