//! Session key lifecycle
//!
//! One [`SessionKeyManager`] owns the unlocked symmetric key for the whole
//! process. Components hold an `Arc` to it and go through
//! `unlock`/`lock`/`is_unlocked`/`get_key`; nothing else touches the key.
//!
//! Expiry is enforced twice: a timer clears the key when the TTL elapses,
//! and every read re-checks the deadline so a suspended process that missed
//! its timer still reports `Locked`.
//!
//! Concurrent `unlock`/`lock` calls resolve last-write-wins through an epoch
//! counter: an unlock only commits if no other transition started while its
//! key was being derived.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::kdf::{self, ExportedKey, SymmetricKey};
use crate::storage::KeyValueStore;
use crate::{Error, Result};

/// Lifetime of an unlocked session
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Session-store key holding the exported session key
pub const SESSION_KEY: &str = "sessionKey";

enum SessionState {
    Locked,
    Unlocked {
        key: SymmetricKey,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Serialize, Deserialize)]
struct PersistedSession {
    key: ExportedKey,
    /// Epoch milliseconds
    expiry: i64,
}

struct Inner {
    state: Mutex<SessionState>,
    epoch: AtomicU64,
    timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
    session_store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl Inner {
    async fn expire(&self, ticket: u64) {
        let mut state = self.state.lock().await;
        if self.epoch.load(Ordering::SeqCst) != ticket {
            return;
        }
        if matches!(*state, SessionState::Unlocked { .. }) {
            *state = SessionState::Locked;
            self.forget_persisted().await;
            info!("Session expired");
        }
    }

    async fn forget_persisted(&self) {
        if let Some(store) = &self.session_store {
            if let Err(e) = store.remove(SESSION_KEY).await {
                warn!(error = %e, "Failed to clear persisted session key");
            }
        }
    }
}

/// Owner of the process-wide unlocked key
pub struct SessionKeyManager {
    inner: Arc<Inner>,
}

impl SessionKeyManager {
    /// Create a locked manager.
    ///
    /// With a `session_store` the unlocked key is mirrored there so a
    /// restarted context can [`restore`](Self::restore) it. The store must be
    /// session-scoped (see [`crate::storage::MemoryStore`]).
    pub fn new(clock: Arc<dyn Clock>, session_store: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::Locked),
                epoch: AtomicU64::new(0),
                timer: parking_lot::Mutex::new(None),
                session_store,
                clock,
            }),
        }
    }

    /// Derive the session key from `passphrase` and start a fresh TTL.
    ///
    /// Calling this while unlocked replaces the key and resets the timer.
    /// A wrong passphrase is not detected here; it only shows up when the
    /// vault fails to open.
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<()> {
        let ticket = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let secret = passphrase.expose_secret().to_string();
        let salt = kdf::salt_from_string(&secret);
        let key = kdf::derive_key_async(secret, salt).await?;

        let mut state = self.inner.state.lock().await;
        if self.inner.epoch.load(Ordering::SeqCst) != ticket {
            debug!("Unlock superseded by a later transition, discarding key");
            return Ok(());
        }

        // Millisecond precision, the same as the persisted copy
        let expires_at = (self.inner.clock.now() + ttl()).trunc_subsecs(3);
        self.persist(&key, expires_at).await?;
        *state = SessionState::Unlocked { key, expires_at };
        self.schedule_expiry(ticket, SESSION_TTL);
        drop(state);

        info!(expires_at = %expires_at, "Session unlocked");
        Ok(())
    }

    /// Discard the key. A no-op when already locked.
    pub async fn lock(&self) -> Result<()> {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }

        let mut state = self.inner.state.lock().await;
        let was_unlocked = matches!(*state, SessionState::Unlocked { .. });
        *state = SessionState::Locked;
        if let Some(store) = &self.inner.session_store {
            store.remove(SESSION_KEY).await?;
        }
        drop(state);

        if was_unlocked {
            info!("Session locked");
        }
        Ok(())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.get_key().await.is_some()
    }

    /// The session key, only while the session is live.
    ///
    /// A session found past its deadline is cleared on the spot.
    pub async fn get_key(&self) -> Option<SymmetricKey> {
        let mut state = self.inner.state.lock().await;
        match &*state {
            SessionState::Locked => return None,
            SessionState::Unlocked { key, expires_at } => {
                if self.inner.clock.now() < *expires_at {
                    return Some(key.clone());
                }
            }
        }
        *state = SessionState::Locked;
        self.inner.forget_persisted().await;
        debug!("Session found expired on read");
        None
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &*self.inner.state.lock().await {
            SessionState::Unlocked { expires_at, .. } => Some(*expires_at),
            SessionState::Locked => None,
        }
    }

    /// Re-hydrate an unlocked session from the session store.
    ///
    /// Returns whether the manager is unlocked afterwards. Expired or
    /// unreadable entries are removed.
    pub async fn restore(&self) -> Result<bool> {
        let Some(store) = &self.inner.session_store else {
            return Ok(self.is_unlocked().await);
        };

        let mut state = self.inner.state.lock().await;
        if let SessionState::Unlocked { expires_at, .. } = &*state {
            return Ok(self.inner.clock.now() < *expires_at);
        }

        let Some(value) = store.get(SESSION_KEY).await? else {
            return Ok(false);
        };
        let persisted: PersistedSession = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                store.remove(SESSION_KEY).await?;
                return Ok(false);
            }
        };

        let now = self.inner.clock.now();
        let expires_at = match Utc.timestamp_millis_opt(persisted.expiry).single() {
            Some(at) if at > now => at,
            _ => {
                store.remove(SESSION_KEY).await?;
                return Ok(false);
            }
        };
        let key = SymmetricKey::import(&persisted.key)?;

        let ticket = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *state = SessionState::Unlocked { key, expires_at };
        let remaining = (expires_at - now).to_std().unwrap_or_default();
        self.schedule_expiry(ticket, remaining);
        drop(state);

        info!(expires_at = %expires_at, "Session restored");
        Ok(true)
    }

    async fn persist(&self, key: &SymmetricKey, expires_at: DateTime<Utc>) -> Result<()> {
        let Some(store) = &self.inner.session_store else {
            return Ok(());
        };
        let persisted = PersistedSession {
            key: key.export(),
            expiry: expires_at.timestamp_millis(),
        };
        store
            .set(SESSION_KEY, serde_json::to_value(&persisted)?)
            .await
            .map_err(|e| Error::Storage(format!("failed to persist session: {e}")))
    }

    fn schedule_expiry(&self, ticket: u64, after: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(ticket).await;
            }
        });
        if let Some(previous) = self.inner.timer.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), None)
    }
}

impl std::fmt::Debug for SessionKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyManager")
            .field("epoch", &self.inner.epoch.load(Ordering::SeqCst))
            .field("persistent", &self.inner.session_store.is_some())
            .finish_non_exhaustive()
    }
}

fn ttl() -> chrono::Duration {
    chrono::Duration::seconds(SESSION_TTL.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn manual() -> (Arc<ManualClock>, SessionKeyManager, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let manager = SessionKeyManager::new(clock.clone(), Some(store.clone()));
        (clock, manager, store)
    }

    #[tokio::test]
    async fn unlock_then_lock() {
        let (_, manager, store) = manual();
        assert!(!manager.is_unlocked().await);

        manager.unlock(&secret("pw")).await.unwrap();
        assert!(manager.is_unlocked().await);
        assert!(store.contains(SESSION_KEY).await.unwrap());

        manager.lock().await.unwrap();
        assert!(!manager.is_unlocked().await);
        assert!(manager.get_key().await.is_none());
        assert!(!store.contains(SESSION_KEY).await.unwrap());

        // Locking twice is harmless
        manager.lock().await.unwrap();
    }

    #[tokio::test]
    async fn key_matches_deterministic_derivation() {
        let (_, manager, _) = manual();
        manager.unlock(&secret("pw")).await.unwrap();
        let expected = kdf::derive_key("pw", &kdf::salt_from_string("pw"));
        assert_eq!(manager.get_key().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn lazily_expired_session_reads_as_locked() {
        let (clock, manager, store) = manual();
        manager.unlock(&secret("pw")).await.unwrap();

        clock.advance(chrono::Duration::minutes(59));
        assert!(manager.is_unlocked().await);

        clock.advance(chrono::Duration::minutes(2));
        assert!(manager.get_key().await.is_none());
        assert!(manager.expires_at().await.is_none());
        assert!(!store.contains(SESSION_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_again_resets_deadline() {
        let (clock, manager, _) = manual();
        manager.unlock(&secret("pw")).await.unwrap();
        let first = manager.expires_at().await.unwrap();

        clock.advance(chrono::Duration::minutes(30));
        manager.unlock(&secret("pw")).await.unwrap();
        let second = manager.expires_at().await.unwrap();
        assert_eq!(second - first, chrono::Duration::minutes(30));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_clears_session_after_ttl() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionKeyManager::new(Arc::new(SystemClock), Some(store.clone()));
        manager.unlock(&secret("pw")).await.unwrap();

        tokio::time::sleep(SESSION_TTL + Duration::from_secs(1)).await;

        assert!(matches!(
            *manager.inner.state.lock().await,
            SessionState::Locked
        ));
        assert!(!store.contains(SESSION_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn lock_racing_unlock_ends_locked() {
        let (_, manager, _) = manual();
        let manager = Arc::new(manager);

        let unlocking = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.unlock(&secret("pw")).await })
        };
        // Lock lands while the key is still being derived
        tokio::task::yield_now().await;
        manager.lock().await.unwrap();
        unlocking.await.unwrap().unwrap();

        // Either the unlock was discarded, or it committed before the lock
        // and the lock then cleared it
        assert!(!manager.is_unlocked().await);
    }

    #[tokio::test]
    async fn restore_rehydrates_from_session_store() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());

        let first = SessionKeyManager::new(clock.clone(), Some(store.clone()));
        first.unlock(&secret("pw")).await.unwrap();
        let key = first.get_key().await.unwrap();

        // A restarted context shares the session store but not memory
        let second = SessionKeyManager::new(clock.clone(), Some(store.clone()));
        assert!(!second.is_unlocked().await);
        assert!(second.restore().await.unwrap());
        assert_eq!(second.get_key().await.unwrap(), key);
        let deadline = first.expires_at().await.unwrap();
        assert_eq!(deadline.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(second.expires_at().await, Some(deadline));
    }

    #[tokio::test]
    async fn restore_drops_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());

        let first = SessionKeyManager::new(clock.clone(), Some(store.clone()));
        first.unlock(&secret("pw")).await.unwrap();
        clock.advance(chrono::Duration::hours(2));

        let second = SessionKeyManager::new(clock.clone(), Some(store.clone()));
        assert!(!second.restore().await.unwrap());
        assert!(!store.contains(SESSION_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn without_store_nothing_is_persisted() {
        let manager = SessionKeyManager::default();
        manager.unlock(&secret("pw")).await.unwrap();
        assert!(manager.restore().await.unwrap());

        manager.lock().await.unwrap();
        assert!(!manager.restore().await.unwrap());
    }
}
