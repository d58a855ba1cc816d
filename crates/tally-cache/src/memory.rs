use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{CacheError, Clock, CounterCache, SystemClock};
use tracing::trace;

use crate::Result;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expire_at: Option<Timestamp>,
}

impl Entry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }
}

/// An in-process implementation of [`CounterCache`].
///
/// Entries are kept in a [`DashMap`]; each operation holds the shard lock
/// of its key, which makes `incr_by` and `set_nx_with_ttl` atomic. Expiry is
/// evaluated against the injected [`Clock`] on every read, and
/// [`sweep_expired`](CounterCache::sweep_expired) reclaims entries that
/// are never read again.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct InMemoryCounterCache {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterCache {
    /// Creates a cache that expires entries by wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Creates a cache that expires entries by the given clock.
    pub fn with_clock(clock: impl Clock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock: Arc::new(clock),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deadline(&self, ttl: Duration) -> Result<Timestamp> {
        let ttl = SignedDuration::try_from(ttl)
            .map_err(|e| CacheError::InvalidData(format!("ttl out of range: {e}")))?;
        self.clock
            .now()
            .checked_add(ttl)
            .map_err(|e| CacheError::InvalidData(format!("ttl out of range: {e}")))
    }
}

impl Default for InMemoryCounterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCounterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCounterCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterCache for InMemoryCounterCache {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = self.clock.now();

        let Some(entry) = self.entries.get(key).map(|entry| *entry) else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            trace!(key = %key, "Evicting expired counter");
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let expire_at = self.deadline(ttl)?;
        self.entries.insert(
            key.to_owned(),
            Entry {
                value,
                expire_at: Some(expire_at),
            },
        );
        Ok(())
    }

    async fn set_nx_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let fresh = Entry {
            value,
            expire_at: Some(self.deadline(ttl)?),
        };

        match self.entries.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn incr_by(&self, key: &str, by: u64) -> Result<u64> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_owned()).or_insert(Entry {
            value: 0,
            expire_at: None,
        });

        if entry.is_expired(now) {
            *entry = Entry {
                value: 0,
                expire_at: None,
            };
        }

        entry.value = entry
            .value
            .checked_add(by)
            .ok_or_else(|| CacheError::InvalidData(format!("counter '{key}' overflowed")))?;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expire_at = self.deadline(ttl)?;

        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };

        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            return Ok(false);
        }

        entry.expire_at = Some(expire_at);
        Ok(true)
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            trace!(swept, "Swept expired counters");
        }
        Ok(swept)
    }
}
