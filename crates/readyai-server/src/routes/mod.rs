//! HTTP route handlers.

pub mod notifications;
pub mod settings;
pub mod sites;
pub mod tabs;
pub mod ws;

use axum::{http::StatusCode, Json};
use readyai_core::ReadyAiError;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Map a core error onto an HTTP response.
pub(crate) fn error_response(e: ReadyAiError) -> (StatusCode, String) {
    let status = match &e {
        ReadyAiError::CustomSiteNotFound(_) | ReadyAiError::UnknownSite(_) => StatusCode::NOT_FOUND,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
