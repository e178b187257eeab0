//! Notification click relay.

use crate::state::AppState;
use axum::{extract::State, Json};
use readyai_types::TabId;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct NotificationClickResponse {
    /// The tab brought to the front, if any completed tab remained.
    pub focused: Option<TabId>,
}

pub async fn clicked(State(state): State<Arc<AppState>>) -> Json<NotificationClickResponse> {
    Json(NotificationClickResponse {
        focused: state.coordinator.notification_clicked().await,
    })
}
