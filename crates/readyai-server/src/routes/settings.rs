//! Extension settings.

use super::error_response;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use readyai_types::Settings;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn get(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.coordinator.settings())
}

/// Replace the settings. Invalid settings are rejected and nothing is saved.
pub async fn put(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    let applied = state.coordinator.apply_settings(settings).await.map_err(|e| {
        warn!(target: "readyai::api", "Rejected settings: {}", e);
        error_response(e)
    })?;

    state
        .settings_store
        .save(&applied)
        .map_err(error_response)?;
    info!(target: "readyai::api", "Settings updated");
    Ok(Json(applied))
}
