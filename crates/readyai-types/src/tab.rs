//! Tab and frame state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

/// Frame id within a tab. The top document is frame 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u32);

impl FrameId {
    pub const TOP: FrameId = FrameId(0);

    pub fn is_top(self) -> bool {
        self == Self::TOP
    }
}

/// Browser window id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window:{}", self.0)
    }
}

/// Tab-level completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    /// Nothing in progress, nothing unread.
    Neutral,
    /// At least one frame reports a generation in progress.
    Pending,
    /// Generation finished and the user has not interacted with the tab yet.
    Completed,
}

impl fmt::Display for TabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TabStatus::Neutral => "neutral",
            TabStatus::Pending => "pending",
            TabStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Last report received from one (tab, frame).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameState {
    pub is_generating: bool,
    pub site_key: String,
    pub site_name: String,
    /// Milliseconds since the Unix epoch.
    pub last_report_at: u64,
}

/// Aggregated state of one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabState {
    pub status: TabStatus,
    pub site_key: String,
    pub site_name: String,
    /// Start of the current PENDING episode; `None` outside PENDING.
    pub pending_since_at: Option<u64>,
    /// When the idle probe last nudged this tab.
    pub last_nudge_at: Option<u64>,
    /// When the tab last entered COMPLETED.
    pub completed_at: Option<u64>,
}

impl TabState {
    pub fn neutral(site_key: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            status: TabStatus::Neutral,
            site_key: site_key.into(),
            site_name: site_name.into(),
            pending_since_at: None,
            last_nudge_at: None,
            completed_at: None,
        }
    }
}

/// Read-only view of a tracked tab, for inspection APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    pub status: TabStatus,
    pub site_key: String,
    pub site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_since_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_nudge_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub frame_count: usize,
    pub generating_frames: usize,
}

/// What the browser host knows about an open tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

/// System idle state as reported by the browser host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    #[default]
    Active,
    Idle,
    Locked,
}

impl IdleState {
    /// Idle or locked: the user is not looking at the screen.
    pub fn is_away(self) -> bool {
        matches!(self, IdleState::Idle | IdleState::Locked)
    }
}
