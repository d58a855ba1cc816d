use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// The durable record for one short code.
///
/// `visit_count` only ever grows. It reflects every visit flushed up to
/// the last successful flush and may lag the true total by at most one
/// flush threshold or one flush window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The short code, immutable after creation.
    pub code: ShortCode,
    /// The URL visitors are redirected to.
    pub destination: String,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the record expires, if ever.
    pub expire_at: Option<Timestamp>,
    /// Cumulative visits as of the last flush.
    pub visit_count: u64,
}

impl LinkRecord {
    /// Creates a fresh record with no expiry and no visits.
    pub fn new(code: ShortCode, destination: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            code,
            destination: destination.into(),
            created_at,
            expire_at: None,
            visit_count: 0,
        }
    }

    pub fn with_expiry(mut self, expire_at: Timestamp) -> Self {
        self.expire_at = Some(expire_at);
        self
    }

    pub fn with_visit_count(mut self, visit_count: u64) -> Self {
        self.visit_count = visit_count;
        self
    }

    /// Whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }
}
