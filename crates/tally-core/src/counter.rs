use crate::error::CacheError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A shared, low-latency counter cache with atomic increments and TTLs.
///
/// Keys are plain strings; implementations may namespace them further.
/// [`incr_by`](CounterCache::incr_by) must be atomic across concurrent callers.
#[async_trait]
pub trait CounterCache: Send + Sync + 'static {
    /// Reads a counter. Returns `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Unconditionally writes a counter with the given TTL.
    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<()>;

    /// Writes a counter with the given TTL only if the key is absent.
    /// Returns `true` if this call created the key.
    async fn set_nx_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<bool>;

    /// Atomically adds `by` to a counter and returns the new value.
    ///
    /// An absent key is treated as zero and created without a TTL.
    async fn incr_by(&self, key: &str, by: u64) -> Result<u64>;

    /// Atomically increments a counter by one and returns the new value.
    async fn incr(&self, key: &str) -> Result<u64> {
        self.incr_by(key, 1).await
    }

    /// Resets the TTL of an existing key.
    /// Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Drops entries whose TTL has lapsed and returns how many were removed.
    ///
    /// Caches that expire keys on their own keep the default no-op.
    async fn sweep_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

#[async_trait]
impl<T: CounterCache + ?Sized> CounterCache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        (**self).get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn set_nx_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<bool> {
        (**self).set_nx_with_ttl(key, value, ttl).await
    }

    async fn incr_by(&self, key: &str, by: u64) -> Result<u64> {
        (**self).incr_by(key, by).await
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        (**self).incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        (**self).expire(key, ttl).await
    }

    async fn sweep_expired(&self) -> Result<usize> {
        (**self).sweep_expired().await
    }
}

/// Key of the running visit counter for a code.
pub fn visit_counter_key(code: &ShortCode) -> String {
    format!("visits:{}", code.as_str())
}

/// Key of the marker that records a flush window is open for a code.
pub fn window_marker_key(code: &ShortCode) -> String {
    format!("visits:{}:window", code.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        let code = ShortCode::new_unchecked("abc123");
        assert_eq!(visit_counter_key(&code), "visits:abc123");
        assert_eq!(window_marker_key(&code), "visits:abc123:window");
    }
}
