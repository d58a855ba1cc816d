use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use tally_core::{Clock, LinkRecord, LinkStore, ShortCode, StorageError, SystemClock};
use tracing::debug;

use crate::Result;

const SCHEMA: &str = include_str!("../ddl/mysql/short_links.sql");

/// MySQL implementation of the [`LinkStore`] contract.
///
/// Soft delete is implemented with `deleted_at`. Reads return every record
/// that has not been deleted, expired or not, so the redirector can answer
/// `Gone` and delete it. Inserts never reuse an existing short code,
/// including soft-deleted rows, to keep a single row per code.
///
/// Deletion timestamps come from the injected [`Clock`].
#[derive(Clone)]
pub struct MySqlLinkStore {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MySqlLinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlLinkStore")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl MySqlLinkStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps deletions with the given clock instead of wall-clock time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_links` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn parse_timestamp(column: &str, seconds: i64) -> Result<Timestamp> {
    Timestamp::from_second(seconds).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{seconds}': {e}"))
    })
}

fn parse_record(row: &MySqlRow) -> Result<LinkRecord> {
    let code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let destination: String = row.try_get("destination").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
    let visit_count: u64 = row.try_get("visit_count").map_err(map_sqlx_error)?;

    Ok(LinkRecord {
        code: ShortCode::new_unchecked(code),
        destination,
        created_at: parse_timestamp("created_at", created_at)?,
        expire_at: expire_at
            .map(|seconds| parse_timestamp("expire_at", seconds))
            .transpose()?,
        visit_count,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl LinkStore for MySqlLinkStore {
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, destination, created_at, expire_at, visit_count
            FROM short_links
            WHERE short_code = ?
              AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(parse_record).transpose()
    }

    async fn insert(&self, record: LinkRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_links
                (short_code, destination, created_at, expire_at, visit_count, deleted_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(record.code.as_str())
        .bind(&record.destination)
        .bind(record.created_at.as_second())
        .bind(record.expire_at.map(|ts| ts.as_second()))
        .bind(record.visit_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE short_links
            SET deleted_at = ?
            WHERE short_code = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(self.clock.now().as_second())
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn store_visit_count(&self, code: &ShortCode, count: u64) -> Result<()> {
        // GREATEST keeps the write monotonic when flushes race.
        let result = sqlx::query(
            r#"
            UPDATE short_links
            SET visit_count = GREATEST(visit_count, ?)
            WHERE short_code = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(count)
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(code = %code, count, changed = result.rows_affected(), "Stored visit count");
        Ok(())
    }

    async fn increment_visit_count(&self, code: &ShortCode) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE short_links
            SET visit_count = visit_count + 1
            WHERE short_code = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(code.to_string()));
        }

        Ok(())
    }

    async fn list(&self, now: Timestamp, limit: u64, offset: u64) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_code, destination, created_at, expire_at, visit_count
            FROM short_links
            WHERE deleted_at IS NULL
              AND (expire_at IS NULL OR expire_at > ?)
            ORDER BY created_at, short_code
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(now.as_second())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(parse_record).collect()
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64> {
        let now = now.as_second();

        let result = sqlx::query(
            r#"
            UPDATE short_links
            SET deleted_at = ?
            WHERE deleted_at IS NULL
              AND expire_at IS NOT NULL
              AND expire_at <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
