//! Media tool capability listings.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use transcoder_core::MediaListing;

use super::error::{engine_error, error_response, ApiError};
use crate::state::AppState;

/// Raw output of the encoder for one of its `-formats`, `-codecs`, ... listings.
pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    let listing: MediaListing = kind.parse().map_err(|e: String| {
        let valid: Vec<&str> = MediaListing::ALL.iter().map(|l| l.as_str()).collect();
        error_response(
            StatusCode::BAD_REQUEST,
            format!("{}, valid kinds are [{}]", e, valid.join(", ")),
        )
    })?;

    let output = state
        .engine()
        .media_info(listing)
        .await
        .map_err(engine_error)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], output).into_response())
}
