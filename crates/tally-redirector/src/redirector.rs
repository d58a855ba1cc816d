use crate::Result;
use async_trait::async_trait;
use tally_core::{LinkRecord, ShortCode};

#[async_trait]
pub trait Redirector: Send + Sync + 'static {
    /// Resolves a short code to its destination and records one visit.
    ///
    /// Returns `Err(NotFound)` for unknown codes and `Err(Gone)` for
    /// expired ones, which are deleted on the way.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Returns the stored record without recording a visit.
    ///
    /// Expiry is enforced exactly as in [`resolve`](Redirector::resolve).
    async fn inspect(&self, code: &ShortCode) -> Result<LinkRecord>;

    /// Deletes a link on behalf of its owner.
    /// Returns `true` if the record existed and was removed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Lists links that have not expired, oldest first.
    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<LinkRecord>>;

    /// Deletes every expired link and returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}
