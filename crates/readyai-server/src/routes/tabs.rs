//! Tracked tab inspection.

use crate::state::AppState;
use axum::{extract::State, Json};
use readyai_types::TabSnapshot;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct TabListResponse {
    pub tabs: Vec<TabSnapshot>,
    pub pending_count: usize,
    pub completed_count: usize,
    /// Server time the ages in `tabs` can be measured against.
    pub now_ms: u64,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<TabListResponse> {
    use readyai_types::TabStatus;

    let tabs = state.coordinator.snapshot().await;
    let count = |status: TabStatus| tabs.iter().filter(|t| t.status == status).count();
    Json(TabListResponse {
        pending_count: count(TabStatus::Pending),
        completed_count: count(TabStatus::Completed),
        now_ms: state.coordinator.now_ms(),
        tabs,
    })
}
