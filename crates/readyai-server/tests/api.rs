//! HTTP API tests driven through the router.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use readyai_core::FrameReport;
use readyai_server::{app, config::Config, host_ws::handle_host_event, state::AppState};
use readyai_types::{
    BackgroundMessage, FrameId, HostCommand, HostEvent, Settings, TabId, TabInfo, WindowId,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn create_test_app() -> (Router, Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        settings_path: temp_dir.path().join("settings.json"),
        settle_delay_ms: 0,
    };
    let state = Arc::new(AppState::new(config).expect("Failed to create AppState"));
    (app::router(state.clone()), state, temp_dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn gemini_tab(id: u32, active: bool) -> TabInfo {
    TabInfo {
        id: TabId(id),
        window_id: WindowId(1),
        url: format!("https://gemini.google.com/app/{}", id),
        active,
    }
}

#[tokio::test]
async fn test_health() {
    let (app, _, _temp) = create_test_app();
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_settings_roundtrip_is_clamped_and_persisted() {
    let (app, state, _temp) = create_test_app();

    let (status, body) = send(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({ "dndMode": true, "probePeriodMin": 0.2, "probeIdleSec": 99999 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dndMode"], true);
    assert_eq!(body["probePeriodMin"], 1.0);
    assert_eq!(body["probeIdleSec"], 3600);

    let stored = state.settings_store.load().unwrap();
    assert!(stored.dnd_mode);
    assert_eq!(stored.probe_idle_sec, 3600);

    let (_, body) = send(&app, "GET", "/api/settings", None).await;
    assert_eq!(body["dndMode"], true);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected_and_not_saved() {
    let (app, state, _temp) = create_test_app();

    let site = json!({
        "id": "custom_dup",
        "name": "Dup",
        "url_patterns": ["https://dup.example/*"],
        "enabled": true
    });
    let (status, _) = send(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({ "customSites": [site.clone(), site] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!state.settings_store.path().exists());
    assert!(state.coordinator.settings().custom_sites.is_empty());
}

#[tokio::test]
async fn test_custom_site_lifecycle() {
    let (app, state, _temp) = create_test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/sites/custom",
        Some(json!({ "name": "Broken", "patterns_text": "ftp://nope/*" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_null());

    let (status, site) = send(
        &app,
        "POST",
        "/api/sites/custom",
        Some(json!({
            "name": "",
            "patterns_text": "http://localhost:3000/*; https://*.example.com/chat/*",
            "detection": "claude"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(site["name"], "Custom");
    assert_eq!(site["detection"], "claude");
    assert_eq!(site["url_patterns"].as_array().unwrap().len(), 2);
    let id = site["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("custom_"));

    let (_, sites) = send(&app, "GET", "/api/sites", None).await;
    assert_eq!(sites["custom"][0]["id"], id.as_str());
    assert_eq!(sites["builtin"].as_array().unwrap().len(), 7);
    assert!(state.coordinator.resolve("https://a.example.com/chat/1").await.is_some());
    assert_eq!(state.settings_store.load().unwrap().custom_sites.len(), 1);

    let uri = format!("/api/sites/custom/{}", id);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_toggle_builtin_site() {
    let (app, state, _temp) = create_test_app();

    let (status, _) = send(&app, "PUT", "/api/sites/poe/enabled", Some(json!({ "enabled": true }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.coordinator.settings().is_builtin_enabled("poe"));

    let (_, sites) = send(&app, "GET", "/api/sites", None).await;
    let poe = sites["builtin"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["key"] == "poe")
        .cloned()
        .unwrap();
    assert_eq!(poe["enabled"], true);

    let (status, _) = send(&app, "PUT", "/api/sites/nope/enabled", Some(json!({ "enabled": true }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabling_site_tells_frames_and_ignores_late_reports() {
    let (app, state, _temp) = create_test_app();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    state.bridge.register_frame(TabId(4), FrameId::TOP, frame_tx);
    handle_host_event(
        &state,
        HostEvent::Started {
            reason: "startup".into(),
            tabs: vec![gemini_tab(4, false)],
        },
    )
    .await;
    state
        .coordinator
        .report_status(TabId(4), FrameId::TOP, FrameReport::new(true, "gemini", "Gemini"))
        .await;
    while frame_rx.try_recv().is_ok() {}

    let (status, _) = send(&app, "PUT", "/api/sites/gemini/enabled", Some(json!({ "enabled": false }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut instructions = Vec::new();
    while let Ok(message) = frame_rx.try_recv() {
        instructions.push(message);
    }
    assert!(instructions.iter().any(|m| matches!(
        m,
        BackgroundMessage::SitesChanged { enabled_sites, .. }
            if enabled_sites.get("gemini") == Some(&false)
    )));

    // A heartbeat that was already in flight.
    let change = state
        .coordinator
        .report_status(TabId(4), FrameId::TOP, FrameReport::new(true, "gemini", "Gemini"))
        .await;
    assert!(change.is_none());
    let (_, body) = send(&app, "GET", "/api/tabs", None).await;
    assert!(body["tabs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tabs_reflect_host_and_frame_activity() {
    let (app, state, _temp) = create_test_app();

    handle_host_event(
        &state,
        HostEvent::Started {
            reason: "install".into(),
            tabs: vec![gemini_tab(4, false), gemini_tab(5, true)],
        },
    )
    .await;

    let (_, body) = send(&app, "GET", "/api/tabs", None).await;
    assert_eq!(body["tabs"].as_array().unwrap().len(), 2);
    assert_eq!(body["tabs"][0]["status"], "neutral");

    state
        .coordinator
        .report_status(TabId(4), FrameId::TOP, FrameReport::new(true, "gemini", "Gemini"))
        .await;
    let (_, body) = send(&app, "GET", "/api/tabs", None).await;
    assert_eq!(body["pending_count"], 1);

    handle_host_event(&state, HostEvent::TabRemoved { tab_id: TabId(4) }).await;
    let (_, body) = send(&app, "GET", "/api/tabs", None).await;
    assert_eq!(body["pending_count"], 0);
    assert_eq!(body["tabs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_completion_notifies_and_click_focuses() {
    let (app, state, _temp) = create_test_app();
    let mut commands = state.bridge.subscribe();

    handle_host_event(
        &state,
        HostEvent::Started {
            reason: "startup".into(),
            tabs: vec![gemini_tab(4, false), gemini_tab(5, true)],
        },
    )
    .await;
    for generating in [true, false] {
        state
            .coordinator
            .report_status(TabId(4), FrameId::TOP, FrameReport::new(generating, "gemini", "Gemini"))
            .await;
    }

    let (status, body) = send(&app, "POST", "/api/notifications/clicked", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["focused"], 4);

    let mut seen = Vec::new();
    while let Ok(command) = commands.try_recv() {
        seen.push(command);
    }
    assert!(seen.iter().any(|c| matches!(
        c,
        HostCommand::Notify { notification } if notification.title == "Gemini 답변 완료"
    )));
    assert!(seen.contains(&HostCommand::ActivateTab { tab_id: TabId(4) }));
    assert!(seen.contains(&HostCommand::FocusWindow { window_id: WindowId(1) }));
    assert!(seen.contains(&HostCommand::InjectMonitor { tab_id: TabId(4) }));
}

#[tokio::test]
async fn test_settings_loaded_from_disk_on_boot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    let settings = Settings {
        badge_enabled: false,
        ..Settings::default()
    };
    std::fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();

    let state = AppState::new(Config {
        settings_path: path,
        ..Config::default()
    })
    .unwrap();
    assert!(!state.coordinator.settings().badge_enabled);
}
