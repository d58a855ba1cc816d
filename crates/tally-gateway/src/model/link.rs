use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tally_core::LinkRecord;

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    /// A random code is generated when absent.
    #[serde(default)]
    pub short_code: Option<String>,
    pub destination: String,
    /// RFC 3339 timestamp; the link never expires when absent.
    pub expire_at: Option<Timestamp>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LinkResponse {
    pub short_code: String,
    pub short_url: String,
    pub destination: String,
    pub created_at: Timestamp,
    pub expire_at: Option<Timestamp>,
    pub visit_count: u64,
}

impl LinkResponse {
    pub fn from_record(record: LinkRecord, base_url: &str) -> Self {
        Self {
            short_url: record.code.to_url(base_url),
            short_code: record.code.to_string(),
            destination: record.destination,
            created_at: record.created_at,
            expire_at: record.expire_at,
            visit_count: record.visit_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListLinksQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 500;

fn default_limit() -> u64 {
    DEFAULT_LIST_LIMIT
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ListLinksResponse {
    pub links: Vec<LinkResponse>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PurgeResponse {
    pub purged: u64,
}
