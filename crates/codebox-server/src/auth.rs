//! API key check for the sandbox routes

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use codebox::ApiResponse;
use tracing::warn;

use crate::app::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Envelope code for a missing or wrong key
pub const UNAUTHORIZED_CODE: i32 = -401;

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(state.api_key()) {
        warn!(
            path = %request.uri().path(),
            present = provided.is_some(),
            "rejected request with invalid API key"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(UNAUTHORIZED_CODE, "Invalid API key")),
        )
            .into_response();
    }

    next.run(request).await
}
