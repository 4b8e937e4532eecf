use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use okr_core::errors::LedgerError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal error")]
    Internal,
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(m) => ApiError::NotFound(m),
            LedgerError::Unauthorized { .. } => ApiError::Unauthorized(e.to_string()),
            // Decryption requested before any recompute; the caller must recompute first.
            LedgerError::EmptyAggregate(_) => ApiError::Conflict(e.to_string()),
            LedgerError::InvalidProof(_) => ApiError::Unprocessable(e.to_string()),
            LedgerError::UnknownRequest(_) => ApiError::NotFound(e.to_string()),
            LedgerError::Capability(_) | LedgerError::Replay(_) => ApiError::Internal,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}
