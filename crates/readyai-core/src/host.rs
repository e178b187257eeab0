//! Collaborators the coordinator drives: the browser, the toolbar indicator
//! and the notification facility.

use crate::Result;
use readyai_types::{
    BackgroundMessage, IdleState, Indicator, Notification, TabId, TabInfo, WindowId,
};
use std::future::Future;

/// Icon and badge output. Calls are fire-and-forget.
pub trait IndicatorSink: Send + Sync {
    /// Set the icon for `tab`; the badge shows the placeholder only when `badge_visible`.
    fn set_indicator(&self, tab_id: TabId, indicator: Indicator, badge_visible: bool);
    /// Remove the badge text for `tab`.
    fn clear_badge(&self, tab_id: TabId);
    /// Drop delivery state kept for a closed tab. The browser discards the
    /// tab's icon and badge with the tab, so nothing is drawn.
    fn forget_tab(&self, tab_id: TabId);
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// The browser as seen from the background process.
pub trait BrowserHost: Send + Sync + 'static {
    fn list_tabs(&self) -> impl Future<Output = Vec<TabInfo>> + Send;

    fn tab(&self, tab_id: TabId) -> impl Future<Output = Option<TabInfo>> + Send;

    /// The active tab of `window_id`.
    fn active_tab(&self, window_id: WindowId) -> impl Future<Output = Option<TabInfo>> + Send;

    fn activate_tab(&self, tab_id: TabId) -> impl Future<Output = Result<()>> + Send;

    fn focus_window(&self, window_id: WindowId) -> impl Future<Output = Result<()>> + Send;

    /// Deliver to every monitor in the tab. False if nothing received it.
    fn send_to_tab(&self, tab_id: TabId, message: BackgroundMessage) -> impl Future<Output = bool> + Send;

    /// (Re)install the frame monitor into every frame of the tab.
    fn inject_monitor(&self, tab_id: TabId) -> impl Future<Output = Result<()>> + Send;

    /// System idle state for the given threshold.
    fn idle_state(&self, threshold_secs: u32) -> impl Future<Output = IdleState> + Send;
}
