use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tally_core::{CacheError, CounterCache};
use tracing::warn;

use crate::Result;

/// A [`CounterCache`] decorator that bounds every call.
///
/// A call that does not finish within `timeout` is abandoned and reported
/// as [`CacheError::Timeout`], so a stalled backend degrades the same way
/// an unreachable one does.
#[derive(Debug, Clone)]
pub struct TimeoutCache<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutCache<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns a reference to the wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        key: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key = %key, operation, timeout_ms = self.timeout.as_millis() as u64, "Cache call timed out");
                Err(CacheError::Timeout(format!(
                    "{operation} on '{key}' took longer than {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<C: CounterCache> CounterCache for TimeoutCache<C> {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        self.bounded("set_with_ttl", key, self.inner.set_with_ttl(key, value, ttl))
            .await
    }

    async fn set_nx_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<bool> {
        self.bounded(
            "set_nx_with_ttl",
            key,
            self.inner.set_nx_with_ttl(key, value, ttl),
        )
        .await
    }

    async fn incr_by(&self, key: &str, by: u64) -> Result<u64> {
        self.bounded("incr_by", key, self.inner.incr_by(key, by)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.bounded("expire", key, self.inner.expire(key, ttl)).await
    }

    async fn sweep_expired(&self) -> Result<usize> {
        self.bounded("sweep_expired", "*", self.inner.sweep_expired())
            .await
    }
}
