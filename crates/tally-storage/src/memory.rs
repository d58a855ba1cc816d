use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use std::sync::Arc;
use tally_core::{Clock, LinkRecord, LinkStore, ShortCode, StorageError, SystemClock};

use crate::Result;

/// In-memory implementation of [`LinkStore`] using DashMap.
///
/// DashMap provides better concurrency than RwLock<HashMap> because it
/// uses sharded locks, allowing concurrent reads and writes to different
/// buckets without blocking. Visit count updates take the shard lock of
/// their key, so they are atomic per code, and so is the conflict check
/// of an insert. An expired record may be replaced by a new insert; the
/// injected [`Clock`] decides what has expired.
pub struct InMemoryLinkStore {
    storage: DashMap<String, LinkRecord>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLinkStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store that judges expiry by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: DashMap::new(),
            clock,
        }
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for InMemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLinkStore")
            .field("records", &self.storage.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        Ok(self.storage.get(code.as_str()).map(|entry| entry.clone()))
    }

    async fn insert(&self, record: LinkRecord) -> Result<()> {
        let now = self.clock.now();

        // The entry holds the shard lock from the check through the write.
        match self.storage.entry(record.code.as_str().to_owned()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired_at(now) {
                    return Err(StorageError::Conflict(record.code.to_string()));
                }
                occupied.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }
        Ok(())
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.storage.remove(code.as_str()).is_some())
    }

    async fn store_visit_count(&self, code: &ShortCode, count: u64) -> Result<()> {
        if let Some(mut record) = self.storage.get_mut(code.as_str()) {
            record.visit_count = record.visit_count.max(count);
        }
        Ok(())
    }

    async fn increment_visit_count(&self, code: &ShortCode) -> Result<()> {
        let mut record = self
            .storage
            .get_mut(code.as_str())
            .ok_or_else(|| StorageError::NotFound(code.to_string()))?;
        record.visit_count = record.visit_count.saturating_add(1);
        Ok(())
    }

    async fn list(&self, now: Timestamp, limit: u64, offset: u64) -> Result<Vec<LinkRecord>> {
        let mut active: Vec<LinkRecord> = self
            .storage
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.code.as_str().cmp(b.code.as_str()))
        });

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(active.into_iter().skip(offset).take(limit).collect())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64> {
        let mut purged = 0_u64;
        self.storage.retain(|_, record| {
            let expired = record.is_expired_at(now);
            if expired {
                purged += 1;
            }
            !expired
        });
        Ok(purged)
    }
}
