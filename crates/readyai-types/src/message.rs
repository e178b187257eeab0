//! Message protocol between frame monitors, the background coordinator and
//! the browser host.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::{CustomSite, IdleState, Settings, TabId, TabInfo, WindowId};

/// Messages sent from a frame monitor to the background coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FrameMessage {
    /// Current detection result for this frame. Sent on change, on the first
    /// detection pass and on heartbeat.
    ReportStatus {
        is_generating: bool,
        site_key: String,
        site_name: String,
    },
    /// The user clicked or scrolled on a freshly completed page.
    Acknowledge { site_key: String, site_name: String },
    /// Non-top frames ask for the top document URL to resolve their site.
    GetActiveTabUrl,
    /// Receipt for a `force_check` instruction.
    CheckReceived { reason: String },
    /// Reply to a liveness probe.
    Pong,
}

/// Messages sent from the background coordinator to a frame monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BackgroundMessage {
    /// Run detection now.
    ForceCheck { reason: String },
    /// Liveness probe.
    Ping,
    /// Answer to `get_active_tab_url`.
    ActiveTabUrl { url: String },
    /// The monitored-site configuration changed; re-resolve and stop if
    /// this frame's site is no longer monitored.
    SitesChanged {
        enabled_sites: BTreeMap<String, bool>,
        custom_sites: Vec<CustomSite>,
    },
}

impl BackgroundMessage {
    pub fn force_check(reason: impl Into<String>) -> Self {
        BackgroundMessage::ForceCheck {
            reason: reason.into(),
        }
    }

    pub fn sites_changed(settings: &Settings) -> Self {
        BackgroundMessage::SitesChanged {
            enabled_sites: settings.enabled_sites.clone(),
            custom_sites: settings.custom_sites.clone(),
        }
    }
}

/// A desktop notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub icon_path: String,
    pub tab_id: TabId,
}

/// Events pushed by the browser host shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Browser started or the extension was (re)installed; carries every open tab.
    Started {
        reason: String,
        #[serde(default)]
        tabs: Vec<TabInfo>,
    },
    /// A tab was created or its URL changed.
    TabUpdated { tab: TabInfo },
    /// The active tab of a window changed.
    TabActivated { tab_id: TabId, window_id: WindowId },
    /// A tab was closed.
    TabRemoved { tab_id: TabId },
    /// System idle state changed.
    IdleStateChanged { state: IdleState },
    /// The user clicked a completion notification.
    NotificationClicked,
}

/// Commands sent to the browser host shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    SetIndicator {
        tab_id: TabId,
        icon_path: String,
        /// Empty when badges are disabled.
        badge_text: String,
        badge_background: String,
        badge_text_color: String,
    },
    ClearBadge { tab_id: TabId },
    Notify { notification: Notification },
    ActivateTab { tab_id: TabId },
    FocusWindow { window_id: WindowId },
    /// (Re)install the frame monitor into every frame of the tab.
    InjectMonitor { tab_id: TabId },
    /// Threshold used by the host when reporting idle state changes.
    SetIdleDetectionInterval { seconds: u32 },
}
