use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tally_core::{CacheError, CounterCache};
use tracing::{debug, trace, warn};

use crate::Result;

/// A Redis-based implementation of [`CounterCache`].
///
/// Counters are plain Redis integers under a configurable key prefix, so
/// increments use `INCRBY` and seeding uses `SET NX EX`. Redis expires
/// keys itself, so no sweep is needed.
#[derive(Debug, Clone)]
pub struct RedisCounterCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let unreachable = err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal();
    let message = format!("{operation}: {err}");
    if message.to_ascii_lowercase().contains("timed out") || err.is_timeout() {
        CacheError::Timeout(message)
    } else if unreachable {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

/// Redis TTLs have whole-second resolution and reject zero.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisCounterCache {
    /// Creates a new Redis counter cache.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: "tally:".to_string(),
        }
    }

    /// Creates a new Redis counter cache with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for cache keys (e.g., "myapp:")
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a client for `redis_url` and checks it answers `PING`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            CacheError::Initialization(format!("failed to create Redis client: {e}"))
        })?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Initialization(format!("failed to connect to Redis: {e}")))?;

        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Initialization(format!("Redis PING failed: {e}")))?;

        Ok(Self::new(conn))
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CounterCache for RedisCounterCache {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let key = self.cache_key(key);
        trace!(key = %key, "Reading counter from Redis");

        let mut conn = self.conn.clone();
        conn.get::<_, Option<u64>>(&key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis error on get");
            map_redis_error("failed to read counter from Redis", e)
        })
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let key = self.cache_key(key);
        trace!(key = %key, value, "Writing counter to Redis");

        let mut conn = self.conn.clone();
        match conn.set_ex::<_, _, ()>(&key, value, ttl_secs(ttl)).await {
            Ok(()) => {
                debug!(key = %key, value, "Wrote counter to Redis");
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to write counter to Redis");
                Err(map_redis_error("failed to write counter to Redis", e))
            }
        }
    }

    async fn set_nx_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<bool> {
        let key = self.cache_key(key);
        trace!(key = %key, value, "Initializing counter in Redis if absent");

        let mut conn = self.conn.clone();
        // SET ... NX replies OK when it wrote and nil when the key existed.
        let reply = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis error on SET NX");
                map_redis_error("failed to initialize counter in Redis", e)
            })?;

        Ok(reply.is_some())
    }

    async fn incr_by(&self, key: &str, by: u64) -> Result<u64> {
        let key = self.cache_key(key);
        trace!(key = %key, by, "Incrementing counter in Redis");

        let mut conn = self.conn.clone();
        conn.incr::<_, _, u64>(&key, by).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis error on incr");
            map_redis_error("failed to increment counter in Redis", e)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let key = self.cache_key(key);
        trace!(key = %key, ttl_secs = ttl_secs(ttl), "Refreshing counter TTL in Redis");

        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(ttl))
            .query_async::<bool>(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis error on expire");
                map_redis_error("failed to refresh counter TTL in Redis", e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_rounded_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_secs(86_400)), 86_400);
        assert_eq!(ttl_secs(Duration::from_millis(1_500)), 1);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
    }
}

// Tests that need a running Redis instance live in
// tests/redis_counter_integration.rs.
