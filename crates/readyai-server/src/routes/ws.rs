//! WebSocket route handlers.

use crate::frames_ws::{handle_frame_websocket, FrameParams};
use crate::host_ws::handle_host_websocket;
use crate::state::AppState;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use std::sync::Arc;

pub async fn frames(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FrameParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let tab_id = params.tab_id;
        if let Err(e) = handle_frame_websocket(socket, state, params).await {
            tracing::error!(target: "readyai::frames", "Frame WebSocket error for {}: {}", tab_id, e);
        }
    })
}

pub async fn host(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_host_websocket(socket, state).await {
            tracing::error!(target: "readyai::bridge", "Host WebSocket error: {}", e);
        }
    })
}
