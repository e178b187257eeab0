//! WebSocket endpoint for frame monitors.
//!
//! One connection per (tab, frame). Frames send `FrameMessage`s up and
//! receive `BackgroundMessage`s down.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use readyai_types::{BackgroundMessage, FrameId, FrameMessage, TabId, TabInfo, WindowId};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Maximum size of one frame message.
const MAX_MESSAGE_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct FrameParams {
    pub tab_id: TabId,
    #[serde(default)]
    pub frame_id: FrameId,
    #[serde(default)]
    pub window_id: Option<WindowId>,
    /// URL of the connecting frame. Used to seed the tab mirror for top frames
    /// the host has not announced yet.
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn handle_frame_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    params: FrameParams,
) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<BackgroundMessage>();
    let FrameParams {
        tab_id,
        frame_id,
        window_id,
        url,
    } = params;

    seed_tab(&state, tab_id, frame_id, window_id, url).await;
    let registration = state.bridge.register_frame(tab_id, frame_id, tx.clone());
    info!(target: "readyai::frames", "Frame monitor connected: {} {}", tab_id, frame_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                debug!(target: "readyai::frames", "Send to {} {} failed: {}", tab_id, frame_id, e);
                break;
            }
        }
    });

    let coordinator = state.coordinator.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if text.len() > MAX_MESSAGE_SIZE {
                        warn!(target: "readyai::frames", "Oversized message from {} {} dropped", tab_id, frame_id);
                        continue;
                    }
                    let message: FrameMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(target: "readyai::frames", "Bad message from {} {}: {}", tab_id, frame_id, e);
                            continue;
                        }
                    };
                    if let Some(reply) = coordinator.handle_frame_message(tab_id, frame_id, message).await {
                        if tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.bridge.unregister_frame(registration);
    info!(target: "readyai::frames", "Frame monitor disconnected: {} {}", tab_id, frame_id);
    Ok(())
}

async fn seed_tab(
    state: &AppState,
    tab_id: TabId,
    frame_id: FrameId,
    window_id: Option<WindowId>,
    url: Option<String>,
) {
    use readyai_core::BrowserHost;

    let (Some(window_id), Some(url)) = (window_id, url) else {
        return;
    };
    if !frame_id.is_top() || state.bridge.tab(tab_id).await.is_some() {
        return;
    }
    state.bridge.upsert_tab(TabInfo {
        id: tab_id,
        window_id,
        url,
        active: false,
    });
}
