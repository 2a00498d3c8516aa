//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Turns [`ManagerError`] into the uniform `{"error":{"code","message"}}`
//! body with a status drawn from the error taxonomy.
//!
//! # Key invariants and assumptions
//! - Validation and not-found messages reach the caller verbatim.
//! - Internal errors are logged server-side; callers get a generic message.
use crate::api::types::{ErrorItem, ErrorResponse};
use crate::manager::{ErrorKind, ManagerError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Body code for a bearer token that did not resolve.
pub const INVALID_TOKEN_CODE: u32 = 9999;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Structured API error returned by handlers.
///
/// # Invariants
/// - `status` must match the semantics of `body.error.code`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: ErrorItem {
                    code,
                    message: message.into(),
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status and body code for an error category.
pub fn status_for(kind: ErrorKind) -> (StatusCode, u32) {
    match kind {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, 400),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, 404),
        ErrorKind::Authentication => (StatusCode::UNAUTHORIZED, INVALID_TOKEN_CODE),
        ErrorKind::Authorization => (StatusCode::UNAUTHORIZED, 401),
        ErrorKind::RateLimit => (StatusCode::TOO_MANY_REQUESTS, 429),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, 500),
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let kind = err.kind();
        let (status, code) = status_for(kind);
        if kind == ErrorKind::Internal {
            tracing::error!(error = ?err, "console request failed");
            return ApiError::new(status, code, INTERNAL_MESSAGE);
        }
        ApiError::new(status, code, err.to_string())
    }
}

/// Build a 400 error for a malformed request.
pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, 400, message)
}
