//! Built-in and custom site management.

use super::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use readyai_core::normalize_patterns;
use readyai_types::{CustomSite, DetectionMode, BUILTIN_SITES};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct BuiltinSiteView {
    pub key: &'static str,
    pub name: &'static str,
    pub url_patterns: &'static [&'static str],
    pub detection: DetectionMode,
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct SiteListResponse {
    pub builtin: Vec<BuiltinSiteView>,
    pub custom: Vec<CustomSite>,
    pub detection_modes: Vec<DetectionModeView>,
}

#[derive(Serialize)]
pub struct DetectionModeView {
    pub id: DetectionMode,
    pub label: &'static str,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<SiteListResponse> {
    let settings = state.coordinator.settings();
    let builtin = BUILTIN_SITES
        .iter()
        .map(|site| BuiltinSiteView {
            key: site.key,
            name: site.name,
            url_patterns: site.patterns,
            detection: site.detection,
            enabled: settings.is_builtin_enabled(site.key),
        })
        .collect();
    let detection_modes = DetectionMode::ALL
        .iter()
        .map(|mode| DetectionModeView {
            id: *mode,
            label: mode.label(),
        })
        .collect();

    Json(SiteListResponse {
        builtin,
        custom: settings.custom_sites,
        detection_modes,
    })
}

#[derive(Deserialize)]
pub struct CustomSiteRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url_patterns: Vec<String>,
    /// Free-form pattern text, split on newlines, commas and semicolons.
    #[serde(default)]
    pub patterns_text: Option<String>,
    #[serde(default)]
    pub detection: DetectionMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn add_custom(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CustomSiteRequest>,
) -> Result<Json<CustomSite>, (StatusCode, String)> {
    let mut url_patterns = req.url_patterns;
    if let Some(text) = &req.patterns_text {
        url_patterns.extend(normalize_patterns(text));
    }

    let site = state
        .coordinator
        .add_custom_site(CustomSite {
            id: String::new(),
            name: req.name,
            url_patterns,
            detection: req.detection,
            enabled: req.enabled,
        })
        .await
        .map_err(error_response)?;

    state.persist_settings().map_err(error_response)?;
    info!(target: "readyai::api", "Custom site {} added", site.id);
    Ok(Json(site))
}

pub async fn remove_custom(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .coordinator
        .remove_custom_site(&id)
        .await
        .map_err(error_response)?;
    state.persist_settings().map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .coordinator
        .set_site_enabled(&key, req.enabled)
        .await
        .map_err(error_response)?;
    state.persist_settings().map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
