//! In-memory collaborators for coordinator and probe tests.

use crate::{BrowserHost, Coordinator, IndicatorSink, ManualClock, NotificationSink, ReadyAiError, Result};
use readyai_types::{
    BackgroundMessage, IdleState, Indicator, Notification, Settings, TabId, TabInfo, WindowId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostCall {
    Activate(TabId),
    Focus(WindowId),
    Send(TabId, BackgroundMessage),
    Inject(TabId),
    IdleQuery(u32),
}

#[derive(Default)]
pub(crate) struct FakeHost {
    pub tabs: Mutex<Vec<TabInfo>>,
    pub idle: Mutex<IdleState>,
    pub calls: Mutex<Vec<HostCall>>,
    /// Tabs without a live monitor.
    pub unmonitored: Mutex<HashSet<TabId>>,
}

impl FakeHost {
    pub fn with_tabs(tabs: Vec<TabInfo>) -> Self {
        Self {
            tabs: Mutex::new(tabs),
            ..Self::default()
        }
    }

    pub fn set_idle(&self, state: IdleState) {
        *self.idle.lock().unwrap() = state;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn activations(&self) -> Vec<TabId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Activate(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn sent_to(&self, tab_id: TabId) -> Vec<BackgroundMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Send(id, msg) if id == tab_id => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn active_in(&self, window_id: WindowId) -> Option<TabId> {
        self.tabs
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.window_id == window_id && t.active)
            .map(|t| t.id)
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl BrowserHost for FakeHost {
    async fn list_tabs(&self) -> Vec<TabInfo> {
        self.tabs.lock().unwrap().clone()
    }

    async fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.tabs.lock().unwrap().iter().find(|t| t.id == tab_id).cloned()
    }

    async fn active_tab(&self, window_id: WindowId) -> Option<TabInfo> {
        self.tabs
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.window_id == window_id && t.active)
            .cloned()
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<()> {
        self.record(HostCall::Activate(tab_id));
        let mut tabs = self.tabs.lock().unwrap();
        let window = tabs
            .iter()
            .find(|t| t.id == tab_id)
            .map(|t| t.window_id)
            .ok_or(ReadyAiError::TabNotTracked(tab_id))?;
        for tab in tabs.iter_mut().filter(|t| t.window_id == window) {
            tab.active = tab.id == tab_id;
        }
        Ok(())
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<()> {
        self.record(HostCall::Focus(window_id));
        Ok(())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: BackgroundMessage) -> bool {
        self.record(HostCall::Send(tab_id, message));
        let known = self.tabs.lock().unwrap().iter().any(|t| t.id == tab_id);
        known && !self.unmonitored.lock().unwrap().contains(&tab_id)
    }

    async fn inject_monitor(&self, tab_id: TabId) -> Result<()> {
        self.record(HostCall::Inject(tab_id));
        self.unmonitored.lock().unwrap().remove(&tab_id);
        Ok(())
    }

    async fn idle_state(&self, threshold_secs: u32) -> IdleState {
        self.record(HostCall::IdleQuery(threshold_secs));
        *self.idle.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IndicatorCall {
    Set(TabId, Indicator, bool),
    Clear(TabId),
    Forget(TabId),
}

#[derive(Default)]
pub(crate) struct RecordingIndicators {
    pub calls: Mutex<Vec<IndicatorCall>>,
}

impl RecordingIndicators {
    pub fn calls(&self) -> Vec<IndicatorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_for(&self, tab_id: TabId) -> Option<IndicatorCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| match c {
                IndicatorCall::Set(id, ..) | IndicatorCall::Clear(id) | IndicatorCall::Forget(id) => {
                    *id == tab_id
                }
            })
    }
}

impl IndicatorSink for RecordingIndicators {
    fn set_indicator(&self, tab_id: TabId, indicator: Indicator, badge_visible: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(IndicatorCall::Set(tab_id, indicator, badge_visible));
    }

    fn clear_badge(&self, tab_id: TabId) {
        self.calls.lock().unwrap().push(IndicatorCall::Clear(tab_id));
    }

    fn forget_tab(&self, tab_id: TabId) {
        self.calls.lock().unwrap().push(IndicatorCall::Forget(tab_id));
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifications {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifications {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifications {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub(crate) fn tab(id: u32, window: u32, url: &str, active: bool) -> TabInfo {
    TabInfo {
        id: TabId(id),
        window_id: WindowId(window),
        url: url.to_string(),
        active,
    }
}

pub(crate) struct Harness {
    pub coordinator: Arc<Coordinator<FakeHost>>,
    pub host: Arc<FakeHost>,
    pub indicators: Arc<RecordingIndicators>,
    pub notifications: Arc<RecordingNotifications>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(tabs: Vec<TabInfo>, settings: Settings) -> Self {
        let host = Arc::new(FakeHost::with_tabs(tabs));
        let indicators = Arc::new(RecordingIndicators::default());
        let notifications = Arc::new(RecordingNotifications::default());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let coordinator = Arc::new(Coordinator::new(
            host.clone(),
            indicators.clone(),
            notifications.clone(),
            clock.clone(),
            settings,
        ));
        Self {
            coordinator,
            host,
            indicators,
            notifications,
            clock,
        }
    }
}
