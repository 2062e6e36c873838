//! Session authentication state storage.
//!
//! Each browser session owns one [`SessionAuthState`] record, keyed by its
//! [`SessionId`]. An absent record means the session is not logged in and
//! has no login in progress.
//!
//! Records are plain values: callers load a copy, decide, and save or remove
//! it. To keep that read-modify-write atomic per session, callers hold the
//! session's lock from [`SessionLocks`] for the duration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::AuthResult;
use crate::types::session::{SessionAuthState, SessionId};

/// Storage for per-session authentication state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the state of a session.
    ///
    /// Returns `None` if the session has no record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn load(&self, id: &SessionId) -> AuthResult<Option<SessionAuthState>>;

    /// Stores the state of a session, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, id: &SessionId, state: SessionAuthState) -> AuthResult<()>;

    /// Removes the record of a session. Removing a missing record is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, id: &SessionId) -> AuthResult<()>;

    /// Drops records that have been idle too long. Returns how many were
    /// removed.
    ///
    /// Default implementation is a no-op (for backends with native TTL).
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Session store statistics.
#[derive(Debug, Clone, Default)]
pub struct SessionStoreStats {
    /// Number of live records.
    pub size: usize,
    /// Number of records dropped for inactivity.
    pub evictions: u64,
}

struct StoredSession {
    state: SessionAuthState,
    last_access: Instant,
}

impl StoredSession {
    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.duration_since(self.last_access) >= idle_timeout
    }
}

/// In-memory session store with idle expiry.
///
/// Every `load` or `save` refreshes the record's idle timer.
pub struct InMemorySessionStore {
    records: DashMap<SessionId, StoredSession>,
    idle_timeout: Duration,
    evictions: AtomicU64,
}

impl InMemorySessionStore {
    /// Creates a store that forgets sessions idle for `idle_timeout`.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            records: DashMap::new(),
            idle_timeout,
            evictions: AtomicU64::new(0),
        }
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SessionStoreStats {
        SessionStoreStats {
            size: self.records.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> AuthResult<Option<SessionAuthState>> {
        let now = Instant::now();

        if let Some(mut entry) = self.records.get_mut(id) {
            if !entry.is_idle(now, self.idle_timeout) {
                entry.last_access = now;
                return Ok(Some(entry.state.clone()));
            }
            // Idle, drop it
            drop(entry);
            let timeout = self.idle_timeout;
            if self
                .records
                .remove_if(id, |_, entry| entry.is_idle(now, timeout))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(None)
    }

    async fn save(&self, id: &SessionId, state: SessionAuthState) -> AuthResult<()> {
        self.records.insert(
            id.clone(),
            StoredSession {
                state,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> AuthResult<()> {
        self.records.remove(id);
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.records.retain(|_, entry| {
            if entry.is_idle(now, self.idle_timeout) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }
}

// =============================================================================
// Session Locks
// =============================================================================

/// Per-session async mutexes.
///
/// Holding a session's guard makes the holder the single writer of that
/// session's record. Guards for different sessions never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the lock of a session.
    pub async fn lock(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let mutex = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        mutex.lock_owned().await
    }

    /// Drops locks nobody is holding or waiting for.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of tracked locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no locks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
