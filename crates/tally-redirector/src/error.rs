use tally_core::StorageError;
use thiserror::Error;

/// Result type for redirector operations.
pub type Result<T> = std::result::Result<T, RedirectorError>;

/// Errors visible to callers of the redirector.
///
/// Counting failures never show up here: the visit path degrades instead.
#[derive(Debug, Clone, Error)]
pub enum RedirectorError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code has expired: {0}")]
    Gone(String),
    #[error("storage operation failed: {0}")]
    Storage(
        #[from]
        #[source]
        StorageError,
    ),
}
