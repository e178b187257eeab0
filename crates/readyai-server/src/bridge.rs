//! Bridge between the coordinator and the connected browser.
//!
//! The browser-host shim keeps a mirror of open tabs up to date through
//! `HostEvent`s and executes the `HostCommand`s broadcast here. Frame
//! monitors each hold a channel registered under their (tab, frame).

use dashmap::DashMap;
use readyai_core::{BrowserHost, IndicatorSink, NotificationSink, ReadyAiError, Result};
use readyai_types::{
    BackgroundMessage, FrameId, HostCommand, IdleState, Indicator, Notification, TabId, TabInfo,
    WindowId, BADGE_PLACEHOLDER,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

const COMMAND_CAPACITY: usize = 256;

struct FrameEndpoint {
    frame_id: FrameId,
    connection: u64,
    tx: mpsc::UnboundedSender<BackgroundMessage>,
}

/// Handle returned when a frame monitor connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRegistration {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    connection: u64,
}

pub struct HostBridge {
    tabs: DashMap<TabId, TabInfo>,
    frames: DashMap<TabId, Vec<FrameEndpoint>>,
    commands: broadcast::Sender<HostCommand>,
    idle: RwLock<IdleState>,
    idle_threshold: AtomicU32,
    next_connection: AtomicU64,
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge {
    pub fn new() -> Self {
        let (commands, _) = broadcast::channel(COMMAND_CAPACITY);
        Self {
            tabs: DashMap::new(),
            frames: DashMap::new(),
            commands,
            idle: RwLock::new(IdleState::Active),
            idle_threshold: AtomicU32::new(0),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Commands for the browser-host shim.
    pub fn subscribe(&self) -> broadcast::Receiver<HostCommand> {
        self.commands.subscribe()
    }

    fn command(&self, command: HostCommand) -> bool {
        trace!(target: "readyai::bridge", "Host command: {:?}", command);
        self.commands.send(command).is_ok()
    }

    // ========================================================================
    // Tab mirror
    // ========================================================================

    /// Replace the mirror with a full listing.
    pub fn replace_tabs(&self, tabs: Vec<TabInfo>) {
        self.tabs.clear();
        for tab in tabs {
            self.tabs.insert(tab.id, tab);
        }
    }

    /// Insert or update a tab. Returns the previous URL if the tab was known.
    pub fn upsert_tab(&self, tab: TabInfo) -> Option<String> {
        if tab.active {
            self.mark_active(tab.id, tab.window_id);
        }
        self.tabs.insert(tab.id, tab).map(|old| old.url)
    }

    /// Record that `tab_id` is now the active tab of `window_id`.
    pub fn mark_active(&self, tab_id: TabId, window_id: WindowId) {
        for mut entry in self.tabs.iter_mut() {
            if entry.window_id == window_id {
                entry.active = entry.id == tab_id;
            }
        }
    }

    pub fn remove_tab(&self, tab_id: TabId) {
        self.tabs.remove(&tab_id);
        self.frames.remove(&tab_id);
    }

    pub fn set_idle(&self, state: IdleState) {
        match self.idle.write() {
            Ok(mut idle) => *idle = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn current_idle(&self) -> IdleState {
        match self.idle.read() {
            Ok(idle) => *idle,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Frame endpoints
    // ========================================================================

    pub fn register_frame(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        tx: mpsc::UnboundedSender<BackgroundMessage>,
    ) -> FrameRegistration {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let mut endpoints = self.frames.entry(tab_id).or_default();
        // A reconnecting frame replaces its previous endpoint.
        endpoints.retain(|e| e.frame_id != frame_id);
        endpoints.push(FrameEndpoint {
            frame_id,
            connection,
            tx,
        });
        debug!(target: "readyai::bridge", "Registered {} {}", tab_id, frame_id);
        FrameRegistration {
            tab_id,
            frame_id,
            connection,
        }
    }

    /// Drop an endpoint unless it has already been replaced by a newer connection.
    pub fn unregister_frame(&self, registration: FrameRegistration) {
        if let Some(mut endpoints) = self.frames.get_mut(&registration.tab_id) {
            endpoints.retain(|e| e.connection != registration.connection);
        }
        self.frames
            .remove_if(&registration.tab_id, |_, endpoints| endpoints.is_empty());
        debug!(
            target: "readyai::bridge",
            "Unregistered {} {}",
            registration.tab_id,
            registration.frame_id
        );
    }

    pub fn frame_count(&self, tab_id: TabId) -> usize {
        self.frames.get(&tab_id).map(|e| e.len()).unwrap_or(0)
    }
}

impl BrowserHost for HostBridge {
    async fn list_tabs(&self) -> Vec<TabInfo> {
        let mut tabs: Vec<TabInfo> = self.tabs.iter().map(|e| e.value().clone()).collect();
        tabs.sort_by_key(|t| t.id);
        tabs
    }

    async fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.tabs.get(&tab_id).map(|e| e.value().clone())
    }

    async fn active_tab(&self, window_id: WindowId) -> Option<TabInfo> {
        self.tabs
            .iter()
            .find(|e| e.window_id == window_id && e.active)
            .map(|e| e.value().clone())
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<()> {
        let window_id = self
            .tabs
            .get(&tab_id)
            .map(|e| e.window_id)
            .ok_or(ReadyAiError::TabNotTracked(tab_id))?;
        if !self.command(HostCommand::ActivateTab { tab_id }) {
            return Err(ReadyAiError::DeliveryFailed(tab_id));
        }
        self.mark_active(tab_id, window_id);
        Ok(())
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<()> {
        if !self.command(HostCommand::FocusWindow { window_id }) {
            return Err(ReadyAiError::ChannelSendError);
        }
        Ok(())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: BackgroundMessage) -> bool {
        let Some(mut endpoints) = self.frames.get_mut(&tab_id) else {
            return false;
        };
        endpoints.retain(|e| !e.tx.is_closed());
        let delivered = endpoints
            .iter()
            .filter(|e| e.tx.send(message.clone()).is_ok())
            .count();
        trace!(target: "readyai::bridge", "{:?} -> {} ({} frames)", message, tab_id, delivered);
        delivered > 0
    }

    async fn inject_monitor(&self, tab_id: TabId) -> Result<()> {
        if !self.command(HostCommand::InjectMonitor { tab_id }) {
            return Err(ReadyAiError::DeliveryFailed(tab_id));
        }
        Ok(())
    }

    async fn idle_state(&self, threshold_secs: u32) -> IdleState {
        if self.idle_threshold.swap(threshold_secs, Ordering::Relaxed) != threshold_secs {
            self.command(HostCommand::SetIdleDetectionInterval {
                seconds: threshold_secs,
            });
        }
        self.current_idle()
    }
}

impl IndicatorSink for HostBridge {
    fn set_indicator(&self, tab_id: TabId, indicator: Indicator, badge_visible: bool) {
        let style = indicator.style();
        let badge_text = if badge_visible { BADGE_PLACEHOLDER } else { "" };
        self.command(HostCommand::SetIndicator {
            tab_id,
            icon_path: style.icon_path.to_string(),
            badge_text: badge_text.to_string(),
            badge_background: style.badge_background.to_string(),
            badge_text_color: style.badge_text_color.to_string(),
        });
    }

    fn clear_badge(&self, tab_id: TabId) {
        self.command(HostCommand::ClearBadge { tab_id });
    }

    fn forget_tab(&self, tab_id: TabId) {
        // Late frame registrations can land after the host's TabRemoved.
        self.frames.remove(&tab_id);
    }
}

impl NotificationSink for HostBridge {
    fn notify(&self, notification: Notification) {
        if !self.command(HostCommand::Notify { notification }) {
            debug!(target: "readyai::bridge", "No browser host connected; notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u32, window: u32, active: bool) -> TabInfo {
        TabInfo {
            id: TabId(id),
            window_id: WindowId(window),
            url: format!("https://gemini.google.com/app/{}", id),
            active,
        }
    }

    #[tokio::test]
    async fn test_indicator_commands() {
        let bridge = HostBridge::new();
        let mut rx = bridge.subscribe();

        bridge.set_indicator(TabId(3), Indicator::Pending, true);
        bridge.set_indicator(TabId(3), Indicator::Completed, false);

        match rx.recv().await.unwrap() {
            HostCommand::SetIndicator {
                badge_text,
                badge_background,
                icon_path,
                ..
            } => {
                assert_eq!(badge_text, BADGE_PLACEHOLDER);
                assert_eq!(badge_background, "#FFA500");
                assert_eq!(icon_path, "assets/bell_pending.png");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            HostCommand::SetIndicator { badge_text, .. } => assert!(badge_text.is_empty()),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_tab_reaches_every_frame() {
        let bridge = HostBridge::new();
        let (top_tx, mut top_rx) = mpsc::unbounded_channel();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        bridge.register_frame(TabId(1), FrameId(0), top_tx);
        bridge.register_frame(TabId(1), FrameId(5), sub_tx);

        assert!(bridge.send_to_tab(TabId(1), BackgroundMessage::Ping).await);
        assert_eq!(top_rx.recv().await, Some(BackgroundMessage::Ping));
        assert_eq!(sub_rx.recv().await, Some(BackgroundMessage::Ping));
        assert!(!bridge.send_to_tab(TabId(2), BackgroundMessage::Ping).await);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_connection() {
        let bridge = HostBridge::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old = bridge.register_frame(TabId(1), FrameId(0), old_tx);
        bridge.register_frame(TabId(1), FrameId(0), new_tx);

        bridge.unregister_frame(old);
        assert_eq!(bridge.frame_count(TabId(1)), 1);
        assert!(bridge.send_to_tab(TabId(1), BackgroundMessage::Ping).await);
        assert_eq!(new_rx.recv().await, Some(BackgroundMessage::Ping));
    }

    #[tokio::test]
    async fn test_closed_frames_do_not_count_as_delivered() {
        let bridge = HostBridge::new();
        let (tx, rx) = mpsc::unbounded_channel();
        bridge.register_frame(TabId(1), FrameId(0), tx);
        drop(rx);
        assert!(!bridge.send_to_tab(TabId(1), BackgroundMessage::Ping).await);
        assert_eq!(bridge.frame_count(TabId(1)), 0);
    }

    #[tokio::test]
    async fn test_activate_updates_mirror() {
        let bridge = HostBridge::new();
        bridge.replace_tabs(vec![tab(1, 1, true), tab(2, 1, false), tab(3, 2, true)]);

        // No host connected.
        assert!(matches!(
            bridge.activate_tab(TabId(2)).await,
            Err(ReadyAiError::DeliveryFailed(_))
        ));

        let mut rx = bridge.subscribe();
        bridge.activate_tab(TabId(2)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), HostCommand::ActivateTab { tab_id: TabId(2) });
        assert_eq!(bridge.active_tab(WindowId(1)).await.unwrap().id, TabId(2));
        assert_eq!(bridge.active_tab(WindowId(2)).await.unwrap().id, TabId(3));

        assert!(matches!(
            bridge.activate_tab(TabId(9)).await,
            Err(ReadyAiError::TabNotTracked(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_threshold_is_forwarded_once() {
        let bridge = HostBridge::new();
        let mut rx = bridge.subscribe();
        bridge.set_idle(IdleState::Locked);

        assert_eq!(bridge.idle_state(60).await, IdleState::Locked);
        assert_eq!(bridge.idle_state(60).await, IdleState::Locked);
        assert_eq!(
            rx.recv().await.unwrap(),
            HostCommand::SetIdleDetectionInterval { seconds: 60 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_upsert_reports_previous_url() {
        let bridge = HostBridge::new();
        assert_eq!(bridge.upsert_tab(tab(1, 1, false)), None);
        let mut moved = tab(1, 1, true);
        moved.url = "https://example.com/".into();
        assert_eq!(
            bridge.upsert_tab(moved),
            Some("https://gemini.google.com/app/1".to_string())
        );
        assert_eq!(bridge.tab(TabId(1)).await.unwrap().url, "https://example.com/");
    }

    #[tokio::test]
    async fn test_forget_tab_drops_endpoints_without_host_commands() {
        let bridge = HostBridge::new();
        let mut rx = bridge.subscribe();
        let (tx, _frame_rx) = mpsc::unbounded_channel();
        bridge.register_frame(TabId(4), FrameId(0), tx);

        bridge.forget_tab(TabId(4));
        assert_eq!(bridge.frame_count(TabId(4)), 0);
        assert!(!bridge.send_to_tab(TabId(4), BackgroundMessage::Ping).await);
        assert!(rx.try_recv().is_err());
    }
}
