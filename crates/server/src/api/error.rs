//! Mapping of engine errors onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use transcoder_core::EngineError;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Validation → 400, unknown job → 404, busy or closed job → 409,
/// anything else → 500.
pub fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::Request(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::JobBusy(_) | EngineError::JobClosed(_) => StatusCode::CONFLICT,
        EngineError::Pool(_)
        | EngineError::Io(_)
        | EngineError::Media(_)
        | EngineError::Callback(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    error_response(status, err.to_string())
}
