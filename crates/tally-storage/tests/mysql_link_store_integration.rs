use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::Row;
use tally_core::{LinkRecord, ManualClock, ShortCode};
use tally_storage::{LinkStore, MySqlLinkStore, StorageError};
use tally_test_infra::mysql::{MySqlServer, MysqlConfig};

struct Fixture {
    _mysql: MySqlServer,
    store: MySqlLinkStore,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::with_schema().await.expect("start mysql");
        let url = mysql.database_url().await.expect("mysql url");
        let pool = connect_with_retry(&url).await;

        let store = MySqlLinkStore::new(pool);

        Self {
            _mysql: mysql,
            store,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::MySqlPool {
    let mut last_error = None;

    for _ in 0..20 {
        match MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
        {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect mysql: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn record(value: &str, url: &str) -> LinkRecord {
    // Whole seconds, so the round trip through BIGINT columns is exact.
    let created_at = Timestamp::from_second(Timestamp::now().as_second()).unwrap();
    LinkRecord::new(code(value), url, created_at)
}

#[tokio::test]
async fn insert_and_get_round_trip() {
    let fixture = Fixture::start().await;
    let expire_at = Timestamp::from_second(Timestamp::now().as_second() + 3600).unwrap();
    let original = record("abc123", "https://example.com").with_expiry(expire_at);

    fixture.store.insert(original.clone()).await.unwrap();

    let stored = fixture.store.get(&code("abc123")).await.unwrap();
    assert_eq!(stored, Some(original));
}

#[tokio::test]
async fn get_returns_expired_records() {
    let fixture = Fixture::start().await;
    let expired = Timestamp::now() - SignedDuration::from_hours(24);

    fixture
        .store
        .insert(record("xyz789", "https://example.com").with_expiry(expired))
        .await
        .unwrap();

    let stored = fixture.store.get(&code("xyz789")).await.unwrap().unwrap();
    assert!(stored.is_expired_at(Timestamp::now()));
}

#[tokio::test]
async fn insert_conflict_includes_deleted_codes() {
    let fixture = Fixture::start().await;

    fixture.store.insert(record("abc123", "https://a.com")).await.unwrap();
    let err = fixture
        .store
        .insert(record("abc123", "https://b.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    assert!(fixture.store.delete(&code("abc123")).await.unwrap());
    let err = fixture
        .store
        .insert(record("abc123", "https://c.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
async fn delete_is_terminal() {
    let fixture = Fixture::start().await;

    fixture.store.insert(record("abc123", "https://a.com")).await.unwrap();

    assert!(fixture.store.delete(&code("abc123")).await.unwrap());
    assert!(fixture.store.get(&code("abc123")).await.unwrap().is_none());
    assert!(!fixture.store.delete(&code("abc123")).await.unwrap());
}

#[tokio::test]
async fn visit_count_writes() {
    let fixture = Fixture::start().await;
    fixture.store.insert(record("abc123", "https://a.com")).await.unwrap();

    fixture.store.store_visit_count(&code("abc123"), 20).await.unwrap();
    fixture.store.store_visit_count(&code("abc123"), 10).await.unwrap();
    fixture.store.increment_visit_count(&code("abc123")).await.unwrap();

    let stored = fixture.store.get(&code("abc123")).await.unwrap().unwrap();
    assert_eq!(stored.visit_count, 21);

    let err = fixture
        .store
        .increment_visit_count(&code("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn purge_expired_soft_deletes_expired_rows() {
    let fixture = Fixture::start().await;
    let now = Timestamp::now();

    fixture
        .store
        .insert(record("old", "https://old.com").with_expiry(now - SignedDuration::from_hours(1)))
        .await
        .unwrap();
    fixture
        .store
        .insert(record("later", "https://later.com").with_expiry(now + SignedDuration::from_hours(1)))
        .await
        .unwrap();
    fixture.store.insert(record("forever", "https://f.com")).await.unwrap();

    assert_eq!(fixture.store.purge_expired(now).await.unwrap(), 1);
    assert!(fixture.store.get(&code("old")).await.unwrap().is_none());
    assert!(fixture.store.get(&code("later")).await.unwrap().is_some());
    assert!(fixture.store.get(&code("forever")).await.unwrap().is_some());
}

#[tokio::test]
async fn ensure_schema_creates_the_table_on_an_empty_database() {
    let mysql = MySqlServer::new(MysqlConfig::builder().with_schema(false).build())
        .await
        .expect("start mysql");
    let pool = connect_with_retry(&mysql.database_url().await.expect("mysql url")).await;
    let store = MySqlLinkStore::new(pool);

    assert!(store.insert(record("abc123", "https://a.com")).await.is_err());

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
    store.insert(record("abc123", "https://a.com")).await.unwrap();
}

#[tokio::test]
async fn delete_is_stamped_by_the_store_clock() {
    let fixture = Fixture::start().await;
    let deleted_at = Timestamp::from_second(1_800_000_000).unwrap();
    let store = fixture
        .store
        .clone()
        .with_clock(Arc::new(ManualClock::new(deleted_at)));

    store.insert(record("abc123", "https://a.com")).await.unwrap();
    assert!(store.delete(&code("abc123")).await.unwrap());

    let row = sqlx::query("SELECT deleted_at FROM short_links WHERE short_code = ?")
        .bind("abc123")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let stamped: Option<i64> = row.try_get("deleted_at").unwrap();
    assert_eq!(stamped, Some(1_800_000_000));
}

#[tokio::test]
async fn list_returns_active_rows_in_creation_order() {
    let fixture = Fixture::start().await;
    let now = Timestamp::from_second(Timestamp::now().as_second()).unwrap();
    let at = |hours: i64| now - SignedDuration::from_hours(hours);

    for (value, created) in [("ccc", at(1)), ("bbb", at(2)), ("aaa", at(2))] {
        fixture
            .store
            .insert(LinkRecord::new(code(value), "https://a.com", created))
            .await
            .unwrap();
    }
    fixture
        .store
        .insert(LinkRecord::new(code("old"), "https://old.com", at(3)).with_expiry(at(1)))
        .await
        .unwrap();
    fixture.store.insert(LinkRecord::new(code("gone"), "https://g.com", at(4))).await.unwrap();
    fixture.store.delete(&code("gone")).await.unwrap();

    let listed = fixture.store.list(now, 10, 0).await.unwrap();
    let codes: Vec<_> = listed.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, ["aaa", "bbb", "ccc"]);

    let page = fixture.store.list(now, 1, 2).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].code, code("ccc"));
}
