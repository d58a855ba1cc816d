use crate::error::StorageError;
use crate::link::LinkRecord;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use std::sync::Arc;

/// Type alias for store results.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The durable store of short links.
///
/// The redirector reads records and mutates only their visit count. Expired
/// records are still returned by [`get`](LinkStore::get) so the caller can
/// tell an expired code apart from one that never existed.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Retrieves the record for a given short code.
    /// Returns `None` if the code does not exist or was deleted.
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>>;

    /// Inserts a new record. Returns `Err(Conflict)` if the code is taken.
    async fn insert(&self, record: LinkRecord) -> Result<()>;

    /// Deletes the record for a given short code.
    /// Returns `true` if the record existed and was removed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Raises the stored visit count to `count`.
    ///
    /// The write is a monotonic max: a `count` lower than the stored value
    /// leaves the record untouched, so racing or reordered flushes never
    /// regress the count. Missing codes are ignored.
    async fn store_visit_count(&self, code: &ShortCode, count: u64) -> Result<()>;

    /// Adds one visit to the stored count.
    /// Returns `Err(NotFound)` if the code does not exist.
    async fn increment_visit_count(&self, code: &ShortCode) -> Result<()>;

    /// Lists records still active at `now`, oldest first.
    ///
    /// Ties on creation time are ordered by code so paging is stable.
    async fn list(&self, now: Timestamp, limit: u64, offset: u64) -> Result<Vec<LinkRecord>>;

    /// Deletes every record that has expired at `now`.
    /// Returns the number of records removed.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64>;
}

#[async_trait]
impl<T: LinkStore + ?Sized> LinkStore for Arc<T> {
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        (**self).get(code).await
    }

    async fn insert(&self, record: LinkRecord) -> Result<()> {
        (**self).insert(record).await
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        (**self).delete(code).await
    }

    async fn store_visit_count(&self, code: &ShortCode, count: u64) -> Result<()> {
        (**self).store_visit_count(code, count).await
    }

    async fn increment_visit_count(&self, code: &ShortCode) -> Result<()> {
        (**self).increment_visit_count(code).await
    }

    async fn list(&self, now: Timestamp, limit: u64, offset: u64) -> Result<Vec<LinkRecord>> {
        (**self).list(now, limit, offset).await
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64> {
        (**self).purge_expired(now).await
    }
}
