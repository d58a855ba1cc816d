use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tally_core::{ShortCodeError, StorageError};
use tally_redirector::RedirectorError;
use thiserror::Error;
use tracing::warn;

use crate::model::{ErrorBody, ErrorInfo};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Gone(_) => (StatusCode::GONE, "gone"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        }
    }
}

impl From<RedirectorError> for AppError {
    fn from(e: RedirectorError) -> Self {
        match e {
            RedirectorError::NotFound(_) => AppError::NotFound(e.to_string()),
            RedirectorError::Gone(_) => AppError::Gone(e.to_string()),
            RedirectorError::Storage(e) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(_) => AppError::Conflict(e.to_string()),
            StorageError::NotFound(_) => AppError::NotFound(e.to_string()),
            StorageError::InvalidData(_) => AppError::BadRequest(e.to_string()),
            _ => AppError::Unavailable(e.to_string()),
        }
    }
}

impl From<ShortCodeError> for AppError {
    fn from(e: ShortCodeError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            error: ErrorInfo {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirector_errors_map_to_statuses() {
        let cases = [
            (RedirectorError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (RedirectorError::Gone("a".into()), StatusCode::GONE),
            (
                RedirectorError::Storage(StorageError::Timeout("slow".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_and_code().0, status);
        }
    }

    #[test]
    fn storage_errors_map_to_statuses() {
        let conflict = AppError::from(StorageError::Conflict("taken".into()));
        assert_eq!(conflict.status_and_code().0, StatusCode::CONFLICT);

        let invalid = AppError::from(StorageError::InvalidData("bad".into()));
        assert_eq!(invalid.status_and_code().0, StatusCode::BAD_REQUEST);

        let down = AppError::from(StorageError::Unavailable("down".into()));
        assert_eq!(down.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_short_codes_are_bad_requests() {
        let err = AppError::from(ShortCodeError::InvalidCharacter("a b".into()));
        assert_eq!(err.status_and_code(), (StatusCode::BAD_REQUEST, "bad_request"));
    }
}
