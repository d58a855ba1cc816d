use std::time::Duration;

use redis::AsyncCommands;
use tally_cache::{RedisCounterCache, TimeoutCache};
use tally_core::CounterCache;
use tally_test_infra::redis::RedisServer;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Test fixture that manages a Redis container using test-infra.
struct RedisTestContainer {
    redis: RedisServer,
}

impl RedisTestContainer {
    async fn start() -> Self {
        let redis = RedisServer::new().await.expect("Failed to start Redis");
        Self { redis }
    }

    async fn cache(&self) -> RedisCounterCache {
        let url = self.redis.url().await.expect("Failed to get Redis url");
        RedisCounterCache::connect(&url)
            .await
            .expect("Failed to connect to Redis")
    }

    async fn raw(&self) -> redis::aio::MultiplexedConnection {
        self.redis
            .connection()
            .await
            .expect("Failed to get Redis connection")
    }
}

#[tokio::test]
async fn test_get_missing_counter() {
    let fixture = RedisTestContainer::start().await;
    let cache = fixture.cache().await;

    assert_eq!(cache.get("visits:nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_seed_then_increment() {
    let fixture = RedisTestContainer::start().await;
    let cache = fixture.cache().await;

    assert!(cache.set_nx_with_ttl("visits:abc123", 40, DAY).await.unwrap());
    assert!(!cache.set_nx_with_ttl("visits:abc123", 0, DAY).await.unwrap());

    assert_eq!(cache.incr("visits:abc123").await.unwrap(), 41);
    assert_eq!(cache.incr("visits:abc123").await.unwrap(), 42);
    assert_eq!(cache.get("visits:abc123").await.unwrap(), Some(42));
}

#[tokio::test]
async fn test_keys_are_prefixed_and_carry_ttl() {
    let fixture = RedisTestContainer::start().await;
    let cache = fixture.cache().await;
    let mut raw = fixture.raw().await;

    cache.set_with_ttl("visits:abc123", 3, DAY).await.unwrap();

    let value: Option<u64> = raw.get("tally:visits:abc123").await.unwrap();
    assert_eq!(value, Some(3));

    let ttl: i64 = raw.ttl("tally:visits:abc123").await.unwrap();
    assert!(ttl > 0 && ttl <= DAY.as_secs() as i64);
}

#[tokio::test]
async fn test_expire_refreshes_existing_keys_only() {
    let fixture = RedisTestContainer::start().await;
    let cache = fixture.cache().await;
    let mut raw = fixture.raw().await;

    assert!(!cache.expire("visits:nope", DAY).await.unwrap());

    cache
        .set_with_ttl("visits:abc123", 1, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(cache.expire("visits:abc123", DAY).await.unwrap());

    let ttl: i64 = raw.ttl("tally:visits:abc123").await.unwrap();
    assert!(ttl > 60);
}

#[tokio::test]
async fn test_concurrent_increments() {
    let fixture = RedisTestContainer::start().await;
    let cache = fixture.cache().await;
    cache.set_with_ttl("visits:hot", 0, DAY).await.unwrap();

    let mut handles = vec![];
    for _ in 0..20 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                cache.incr("visits:hot").await.unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.get("visits:hot").await.unwrap(), Some(200));
}

#[tokio::test]
async fn test_stopped_server_reports_error_within_timeout() {
    let fixture = RedisTestContainer::start().await;
    let cache = TimeoutCache::new(fixture.cache().await, Duration::from_secs(1));
    cache.incr("visits:abc123").await.unwrap();

    fixture.redis.stop().await.expect("Failed to stop Redis");

    assert!(cache.incr("visits:abc123").await.is_err());
}
