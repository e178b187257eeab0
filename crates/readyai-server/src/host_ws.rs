//! WebSocket endpoint for the browser-host shim.
//!
//! The shim reports browser events (`HostEvent`) and carries out the
//! commands the coordinator issues (`HostCommand`).

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use readyai_types::HostEvent;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub async fn handle_host_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut command_rx = state.bridge.subscribe();

    info!(target: "readyai::bridge", "Browser host connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let command = match command_rx.recv().await {
                Ok(command) => command,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "readyai::bridge", "Browser host lagged; {} commands skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!(target: "readyai::bridge", "Browser host send failed");
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<HostEvent>(&text) {
                    Ok(event) => handle_host_event(&recv_state, event).await,
                    Err(e) => warn!(target: "readyai::bridge", "Bad host event: {}", e),
                },
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

    info!(target: "readyai::bridge", "Browser host disconnected");
    Ok(())
}

/// Apply one browser event to the tab mirror and the coordinator.
pub async fn handle_host_event(state: &AppState, event: HostEvent) {
    debug!(target: "readyai::bridge", "Host event: {:?}", event);
    match event {
        HostEvent::Started { reason, tabs } => {
            state.bridge.replace_tabs(tabs);
            state.coordinator.kick_all_tabs(&reason).await;
        }
        HostEvent::TabUpdated { tab } => {
            let url = tab.url.clone();
            let previous = state.bridge.upsert_tab(tab);
            if previous.is_some_and(|old| old != url) {
                state.coordinator.reconcile_sites().await;
            }
        }
        HostEvent::TabActivated { tab_id, window_id } => {
            state.bridge.mark_active(tab_id, window_id);
        }
        HostEvent::TabRemoved { tab_id } => {
            state.bridge.remove_tab(tab_id);
            state.coordinator.tab_removed(tab_id).await;
        }
        HostEvent::IdleStateChanged { state: idle } => {
            state.bridge.set_idle(idle);
        }
        HostEvent::NotificationClicked => {
            state.coordinator.notification_clicked().await;
        }
    }
}
