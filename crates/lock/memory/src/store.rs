use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use redlock::error::LockError;
use redlock::store::{LockStore, lease_secs};

/// Number of created records between sweeps of expired ones.
const SWEEP_EVERY: usize = 256;

/// Internal entry representing a lock record.
#[derive(Debug, Clone)]
struct LockEntry {
    value: String,
    expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory [`LockStore`] backed by a [`DashMap`].
///
/// Each operation holds the key's shard lock for its whole duration, which
/// gives the same atomicity as a single store command. Expiry is lazy:
/// expired records are evicted on the next operation touching the key, and
/// every [`SWEEP_EVERY`] created records the whole map is swept.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<DashMap<String, LockEntry>>,
    created: Arc<AtomicUsize>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired records.
    pub fn len(&self) -> usize {
        self.records.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every expired record.
    pub fn purge_expired(&self) {
        self.records.retain(|_, entry| !entry.is_expired());
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let lease = Duration::from_secs(lease_secs(lease)?);
        let record = LockEntry {
            value: value.to_owned(),
            expires_at: Instant::now() + lease,
        };

        // The entry guard must be gone before sweeping the map.
        let created = match self.records.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(record);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        };

        if created && (self.created.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_expired();
        }
        Ok(created)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let removed = self
            .records
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == expected);
        // Drop whatever expired record is left behind.
        self.records.remove_if(key, |_, entry| entry.is_expired());
        Ok(removed.is_some())
    }

    async fn ping(&self) -> Result<(), LockError> {
        Ok(())
    }
}
