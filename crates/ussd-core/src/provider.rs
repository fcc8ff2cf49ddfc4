//! Session checkout
//!
//! A request works on a [`SessionBundle`]: the durable interpreter state
//! plus a per-turn cache. The bundle is handed out as a [`SessionLease`] by
//! the [`StorageProvider`] and must be handed back through
//! [`StorageProvider::put`], which persists the durable part and lets the
//! next request for the same session proceed.
//!
//! ## Exclusivity
//!
//! Each session id maps to an async mutex; the lease owns the guard. A second
//! `get` for the same id waits until the first lease is put back, bounded by
//! the configured lease timeout, after which it fails with
//! [`Error::SessionBusy`]. Distinct session ids never wait on each other.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::flags::FlagBits;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Durable interpreter state for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Current menu node; `None` before the first step
    pub cursor: Option<String>,
    /// Nodes visited from the root, cursor last
    pub exec_path: Vec<String>,
    /// Condition flag bits
    pub flags: FlagBits,
    /// Selected language code
    pub language: Option<String>,
    /// Number of steps taken
    pub turns: u64,
    /// Last time the state was persisted
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Move back to the root, keeping flags and language
    pub fn restart(&mut self) {
        self.cursor = None;
        self.exec_path.clear();
    }
}

/// Rendered content of the current turn. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct TurnCache {
    /// Screen text produced by the last step
    pub output: String,
    /// Handler results keyed by symbol
    pub symbols: HashMap<String, String>,
}

/// Everything a request may mutate for its session
#[derive(Debug, Clone, Default)]
pub struct SessionBundle {
    /// Durable part
    pub state: SessionState,
    /// Ephemeral part
    pub cache: TurnCache,
}

/// Exclusive checkout of a session bundle
///
/// Dropping a lease without putting it back releases the session lock but
/// loses the turn's state changes; this is logged.
pub struct SessionLease {
    session_id: String,
    bundle: SessionBundle,
    committed: bool,
    active: Arc<AtomicUsize>,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLease {
    /// Session this lease belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Leased bundle
    pub fn bundle(&self) -> &SessionBundle {
        &self.bundle
    }

    /// Leased bundle, mutably
    pub fn bundle_mut(&mut self) -> &mut SessionBundle {
        &mut self.bundle
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if !self.committed {
            warn!(session_id = %self.session_id, "Session lease dropped without being put back");
        }
        drop(self.guard.take());
        prune_lock(&self.locks, &self.session_id);
    }
}

/// Per-session mutexes, present only while a session is leased or awaited
type LockMap = DashMap<String, Arc<Mutex<()>>>;

fn prune_lock(locks: &LockMap, session_id: &str) {
    // Only the map itself still references the mutex: nobody holds or awaits it
    locks.remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
}

/// Leases session bundles and checks them back in
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Load or create the session's bundle and check it out
    async fn get(&self, session_id: &str) -> Result<SessionLease>;

    /// Persist the durable part and release the checkout
    async fn put(&self, lease: SessionLease) -> Result<()>;

    /// Release backend connections
    async fn close(&self) -> Result<()>;
}

/// Provider over a state backend and a user data backend
pub struct SimpleStorageProvider {
    state: Arc<dyn Backend>,
    userdata: Arc<dyn Backend>,
    locks: Arc<LockMap>,
    lease_timeout: Option<Duration>,
    active: Arc<AtomicUsize>,
}

impl SimpleStorageProvider {
    /// Create a provider. `lease_timeout` of `None` waits indefinitely.
    pub fn new(state: Arc<dyn Backend>, userdata: Arc<dyn Backend>, lease_timeout: Option<Duration>) -> Self {
        Self {
            state,
            userdata,
            locks: Arc::new(DashMap::new()),
            lease_timeout,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of leases currently checked out
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of sessions with a lock entry
    pub fn tracked_sessions(&self) -> usize {
        self.locks.len()
    }

    /// User data backend shared with the stores
    pub fn userdata(&self) -> &Arc<dyn Backend> {
        &self.userdata
    }

    /// Reset a session's durable state to the root node, clearing flags
    pub async fn reset_state(&self, session_id: &str) -> Result<()> {
        let mut lease = self.get(session_id).await?;
        lease.bundle_mut().state = SessionState::default();
        self.put(lease).await?;
        info!(session_id = %session_id, "Session state reset");
        Ok(())
    }

    async fn acquire(&self, session_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match self.lease_timeout {
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| Error::SessionBusy(session_id.to_string())),
            None => Ok(lock.lock_owned().await),
        }
    }

    async fn load_state(&self, session_id: &str) -> Result<SessionState> {
        match self.state.get(session_id.as_bytes()).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Storage(format!("corrupt state for session {}: {}", session_id, e))),
            Err(Error::NotFound(_)) => {
                debug!(session_id = %session_id, "No stored state, starting fresh");
                Ok(SessionState::default())
            }
            Err(e) => Err(Error::Storage(format!("failed to load session {}: {}", session_id, e))),
        }
    }

}

#[async_trait]
impl StorageProvider for SimpleStorageProvider {
    async fn get(&self, session_id: &str) -> Result<SessionLease> {
        let guard = self.acquire(session_id).await?;

        let state = match self.load_state(session_id).await {
            Ok(state) => state,
            Err(e) => {
                drop(guard);
                prune_lock(&self.locks, session_id);
                return Err(e);
            }
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(session_id = %session_id, turns = state.turns, "Session checked out");

        Ok(SessionLease {
            session_id: session_id.to_string(),
            bundle: SessionBundle {
                state,
                cache: TurnCache::default(),
            },
            committed: false,
            active: Arc::clone(&self.active),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        })
    }

    async fn put(&self, mut lease: SessionLease) -> Result<()> {
        lease.committed = true;
        let session_id = lease.session_id.clone();

        let mut state = lease.bundle.state.clone();
        state.updated_at = Some(Utc::now());

        let result = match serde_json::to_vec(&state) {
            Ok(bytes) => self
                .state
                .put(session_id.as_bytes(), &bytes)
                .await
                .map_err(|e| Error::Storage(format!("failed to persist session {}: {}", session_id, e))),
            Err(e) => Err(Error::Storage(format!("failed to encode session {}: {}", session_id, e))),
        };

        drop(lease);

        match &result {
            Ok(()) => debug!(session_id = %session_id, "Session checked in"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Session released without persisting"),
        }
        result
    }

    async fn close(&self) -> Result<()> {
        let active = self.active_leases();
        if active > 0 {
            warn!(active_leases = active, "Closing storage with leases still checked out");
        }
        self.state.close().await?;
        self.userdata.close().await?;
        info!("Storage provider closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn provider(timeout: Option<Duration>) -> Arc<SimpleStorageProvider> {
        Arc::new(SimpleStorageProvider::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            timeout,
        ))
    }

    #[tokio::test]
    async fn test_first_get_creates_state() {
        let provider = provider(None);
        let lease = provider.get("s1").await.unwrap();
        assert_eq!(lease.bundle().state.cursor, None);
        assert_eq!(lease.bundle().state.turns, 0);
        assert_eq!(provider.active_leases(), 1);
        provider.put(lease).await.unwrap();
        assert_eq!(provider.active_leases(), 0);
    }

    #[tokio::test]
    async fn test_state_persists_cache_does_not() {
        let provider = provider(None);

        let mut lease = provider.get("s1").await.unwrap();
        lease.bundle_mut().state.cursor = Some("main".to_string());
        lease.bundle_mut().state.flags.set(9);
        lease.bundle_mut().cache.output = "Balance: 100".to_string();
        provider.put(lease).await.unwrap();

        let lease = provider.get("s1").await.unwrap();
        assert_eq!(lease.bundle().state.cursor.as_deref(), Some("main"));
        assert!(lease.bundle().state.flags.is_set(9));
        assert!(lease.bundle().state.updated_at.is_some());
        assert!(lease.bundle().cache.output.is_empty());
        provider.put(lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_get_waits_for_put() {
        let provider = provider(None);
        let first = provider.get("s1").await.unwrap();

        let p = Arc::clone(&provider);
        let waiter = tokio::spawn(async move {
            let lease = p.get("s1").await.unwrap();
            let turns = lease.bundle().state.turns;
            p.put(lease).await.unwrap();
            turns
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(provider.active_leases(), 1);

        let mut first = first;
        first.bundle_mut().state.turns = 7;
        provider.put(first).await.unwrap();

        // The waiter sees the state written by the first holder
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_busy_after_timeout() {
        let provider = provider(Some(Duration::from_millis(20)));
        let first = provider.get("s1").await.unwrap();

        let err = provider.get("s1").await.unwrap_err();
        assert!(matches!(err, Error::SessionBusy(ref id) if id == "s1"));

        provider.put(first).await.unwrap();
        let again = provider.get("s1").await.unwrap();
        provider.put(again).await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_sessions_concurrent() {
        let provider = provider(Some(Duration::from_millis(20)));
        let a = provider.get("s1").await.unwrap();
        let b = provider.get("s2").await.unwrap();
        assert_eq!(provider.active_leases(), 2);
        provider.put(a).await.unwrap();
        provider.put(b).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_lease_releases_lock() {
        let provider = provider(Some(Duration::from_millis(20)));
        let lease = provider.get("s1").await.unwrap();
        assert_eq!(provider.tracked_sessions(), 1);
        drop(lease);
        assert_eq!(provider.tracked_sessions(), 0);
        assert_eq!(provider.active_leases(), 0);

        let lease = provider.get("s1").await.unwrap();
        provider.put(lease).await.unwrap();
        assert_eq!(provider.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_lock_kept_while_awaited() {
        let provider = provider(None);
        let first = provider.get("s1").await.unwrap();

        let p = Arc::clone(&provider);
        let waiter = tokio::spawn(async move {
            let lease = p.get("s1").await.unwrap();
            p.put(lease).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still references the mutex, so dropping keeps the entry
        drop(first);
        waiter.await.unwrap();
        assert_eq!(provider.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failed_persist_still_releases() {
        let state = Arc::new(MemoryBackend::new());
        let provider = SimpleStorageProvider::new(
            state.clone(),
            Arc::new(MemoryBackend::new()),
            Some(Duration::from_millis(20)),
        );

        let lease = provider.get("s1").await.unwrap();
        state.close().await.unwrap();
        let err = provider.put(lease).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(provider.active_leases(), 0);

        // Lock released: the next get fails on load, not on SessionBusy
        let err = provider.get("s1").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_reset_state() {
        let provider = provider(None);
        let mut lease = provider.get("s1").await.unwrap();
        lease.bundle_mut().state.cursor = Some("pin_entry".to_string());
        lease.bundle_mut().state.flags.set(12);
        provider.put(lease).await.unwrap();

        provider.reset_state("s1").await.unwrap();

        let lease = provider.get("s1").await.unwrap();
        assert_eq!(lease.bundle().state.cursor, None);
        assert!(!lease.bundle().state.flags.is_set(12));
        provider.put(lease).await.unwrap();
    }

    #[test]
    fn test_restart_keeps_flags() {
        let mut state = SessionState {
            cursor: Some("x".to_string()),
            exec_path: vec!["root".to_string(), "x".to_string()],
            ..Default::default()
        };
        state.flags.set(8);
        state.restart();
        assert!(state.cursor.is_none());
        assert!(state.exec_path.is_empty());
        assert!(state.flags.is_set(8));
    }
}
