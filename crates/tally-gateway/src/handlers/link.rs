use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use jiff::Timestamp;
use tally_core::{LinkRecord, ShortCode, StorageError};
use tracing::{debug, info};
use url::Url;

use super::parse_code;
use crate::error::{AppError, Result};
use crate::model::{
    CreateLinkRequest, LinkResponse, ListLinksQuery, ListLinksResponse, PurgeResponse,
    MAX_LIST_LIMIT,
};
use crate::state::AppState;

/// Attempts at finding a free generated code before giving up.
const GENERATE_ATTEMPTS: usize = 5;

pub async fn create_link_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkResponse>)> {
    let requested = request.short_code.map(ShortCode::new).transpose()?;
    validate_destination(&request.destination)?;

    let now = Timestamp::now();
    if let Some(expire_at) = request.expire_at {
        if expire_at <= now {
            return Err(AppError::BadRequest(format!(
                "expire_at must be in the future, got {expire_at}"
            )));
        }
    }
    let build = |code: ShortCode| {
        let record = LinkRecord::new(code, request.destination.clone(), now);
        match request.expire_at {
            Some(expire_at) => record.with_expiry(expire_at),
            None => record,
        }
    };

    let record = match requested {
        Some(code) => {
            let record = build(code);
            state.store().insert(record.clone()).await?;
            record
        }
        None => insert_generated(&state, build).await?,
    };
    info!(code = %record.code, destination = %record.destination, "Created short link");

    Ok((
        StatusCode::CREATED,
        Json(LinkResponse::from_record(record, state.base_url())),
    ))
}

async fn insert_generated(
    state: &AppState,
    build: impl Fn(ShortCode) -> LinkRecord,
) -> Result<LinkRecord> {
    for attempt in 1..=GENERATE_ATTEMPTS {
        let record = build(state.generator().generate());
        match state.store().insert(record.clone()).await {
            Ok(()) => return Ok(record),
            Err(StorageError::Conflict(code)) => {
                debug!(code = %code, attempt, "Generated short code is taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Conflict(format!(
        "no free short code after {GENERATE_ATTEMPTS} attempts"
    )))
}

pub async fn list_links_handler(
    Query(query): Query<ListLinksQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListLinksResponse>> {
    if query.limit == 0 || query.limit > MAX_LIST_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}, got {}",
            query.limit
        )));
    }

    let links = state
        .redirector()
        .list(query.limit, query.offset)
        .await?
        .into_iter()
        .map(|record| LinkResponse::from_record(record, state.base_url()))
        .collect();

    Ok(Json(ListLinksResponse { links }))
}

pub async fn get_link_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LinkResponse>> {
    let code = parse_code(short_code)?;
    let record = state.redirector().inspect(&code).await?;

    Ok(Json(LinkResponse::from_record(record, state.base_url())))
}

pub async fn delete_link_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode> {
    let code = parse_code(short_code)?;

    if state.redirector().delete(&code).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("short code not found: {code}")))
    }
}

pub async fn purge_expired_handler(State(state): State<AppState>) -> Result<Json<PurgeResponse>> {
    let purged = state.redirector().purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}

/// Accepts absolute `http` and `https` URLs that name a host.
fn validate_destination(destination: &str) -> Result<()> {
    let valid = Url::parse(destination)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some())
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "destination must be an absolute http(s) URL: '{destination}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_destination("https://example.com/a?b=c").is_ok());
        assert!(validate_destination("http://example.com").is_ok());
        assert!(validate_destination("https://127.0.0.1:8080/x").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_relative_urls() {
        assert!(validate_destination("ftp://example.com").is_err());
        assert!(validate_destination("javascript:alert(1)").is_err());
        assert!(validate_destination("example.com").is_err());
        assert!(validate_destination("").is_err());
    }

    #[test]
    fn rejects_urls_without_a_host() {
        for destination in [
            "https://",
            "https:///",
            "https://:80",
            "http://?q",
            "https://#frag",
            "https://exa mple.com",
        ] {
            assert!(validate_destination(destination).is_err(), "{destination}");
        }
    }
}
