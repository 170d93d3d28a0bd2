//! Per league+season exclusive locks.
//!
//! Every path that writes a live table (job execution, snapshot restore) goes
//! through `KeyLocks::acquire`, so writes for one key are strictly serialized
//! while different keys proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use matchday_core::LeagueSeasonKey;

/// Held for the duration of a table write. Dropping it releases the key.
#[derive(Debug)]
pub struct KeyGuard {
    key: LeagueSeasonKey,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> LeagueSeasonKey {
        self.key
    }
}

/// Registry of lazily created per-key async mutexes.
///
/// An entry lives only while a guard or waiter holds a clone of it; idle
/// entries are dropped on the next lookup.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    inner: Arc<Mutex<HashMap<LeagueSeasonKey, Arc<AsyncMutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    pub async fn acquire(&self, key: LeagueSeasonKey) -> KeyGuard {
        let lock = self.lock_for(key);
        KeyGuard {
            key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Take `key` only if nobody holds it.
    pub fn try_acquire(&self, key: LeagueSeasonKey) -> Option<KeyGuard> {
        let lock = self.lock_for(key);
        lock.try_lock_owned().ok().map(|guard| KeyGuard { key, _guard: guard })
    }

    fn lock_for(&self, key: LeagueSeasonKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Clones are only handed out under this mutex, so a count of 1 means
        // nobody holds or waits on the entry.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(key).or_default().clone()
    }
}
