use thiserror::Error;

/// Errors returned by a [`CounterCache`](crate::CounterCache) backend.
///
/// The aggregator does not distinguish between variants: any of them means
/// the cache cannot be trusted for the current visit.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache initialization failed: {0}")]
    Initialization(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Errors returned by a [`LinkStore`](crate::LinkStore) backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

/// A string that is not a valid [`ShortCode`](crate::ShortCode).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortCodeError {
    #[error("short code length must be between {min} and {max}, got {actual}")]
    InvalidLength { min: usize, max: usize, actual: usize },
    #[error("short code must contain only alphanumeric characters, hyphens, or underscores: '{0}'")]
    InvalidCharacter(String),
}

/// Rejected [`VisitSettings`](crate::VisitSettings).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("flush threshold must be at least 1")]
    ZeroFlushThreshold,
    #[error("flush window must be longer than zero")]
    ZeroWindow,
    #[error("cache timeout must be longer than zero")]
    ZeroCacheTimeout,
}
