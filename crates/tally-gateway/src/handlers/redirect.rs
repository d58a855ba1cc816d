use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::parse_code;
use crate::error::Result;
use crate::state::AppState;

/// Answers `302 Found` with the destination in `Location`.
pub async fn redirect_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    let code = parse_code(short_code)?;
    let destination = state.redirector().resolve(&code).await?;

    Ok((StatusCode::FOUND, [(header::LOCATION, destination)]).into_response())
}
