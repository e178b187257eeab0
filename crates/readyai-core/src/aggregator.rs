//! Tab aggregator: folds frame reports into one status per tab.
//!
//! The frame and tab maps are private to this type. Every operation that
//! touches them is a single `&mut self` call, so callers that wrap the
//! aggregator in one lock get atomic report processing for free.

use readyai_types::{FrameId, FrameState, TabId, TabSnapshot, TabState, TabStatus};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, trace};

/// One status report from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub is_generating: bool,
    pub site_key: String,
    pub site_name: String,
}

impl FrameReport {
    pub fn new(is_generating: bool, site_key: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            is_generating,
            site_key: site_key.into(),
            site_name: site_name.into(),
        }
    }
}

/// Outcome of applying a report or acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub tab_id: TabId,
    /// `None` when the tab was not tracked before.
    pub previous: Option<TabStatus>,
    pub current: TabStatus,
    pub site_key: String,
    pub site_name: String,
}

impl StatusChange {
    /// Status differs from before (first appearance counts).
    pub fn changed(&self) -> bool {
        self.previous != Some(self.current)
    }

    /// The tab just finished generating.
    pub fn completed(&self) -> bool {
        self.previous == Some(TabStatus::Pending) && self.current == TabStatus::Completed
    }
}

#[derive(Debug, Clone)]
struct TabEntry {
    state: TabState,
    frames: HashMap<FrameId, FrameState>,
}

impl TabEntry {
    fn any_generating(&self) -> bool {
        self.frames.values().any(|f| f.is_generating)
    }

    /// Display identity: a generating frame if any, else the latest report.
    /// Equal timestamps go to the lower frame id.
    fn representative(&self) -> Option<&FrameState> {
        self.frames
            .iter()
            .max_by_key(|(id, f)| (f.is_generating, f.last_report_at, Reverse(**id)))
            .map(|(_, f)| f)
    }
}

#[derive(Debug, Default)]
pub struct TabAggregator {
    tabs: HashMap<TabId, TabEntry>,
}

impl TabAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a frame report and recompute the tab status.
    pub fn apply_report(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        report: FrameReport,
        now_ms: u64,
    ) -> StatusChange {
        let previous = self.tabs.get(&tab_id).map(|e| e.state.status);
        let entry = self.tabs.entry(tab_id).or_insert_with(|| TabEntry {
            state: TabState::neutral(report.site_key.clone(), report.site_name.clone()),
            frames: HashMap::new(),
        });

        entry.frames.insert(
            frame_id,
            FrameState {
                is_generating: report.is_generating,
                site_key: report.site_key,
                site_name: report.site_name,
                last_report_at: now_ms,
            },
        );

        let any_generating = entry.any_generating();
        if let Some((key, name)) = entry
            .representative()
            .map(|rep| (rep.site_key.clone(), rep.site_name.clone()))
        {
            entry.state.site_key = key;
            entry.state.site_name = name;
        }

        let state = &mut entry.state;
        if any_generating {
            if previous != Some(TabStatus::Pending) {
                state.pending_since_at = Some(now_ms);
            }
            state.status = TabStatus::Pending;
        } else {
            match previous {
                Some(TabStatus::Pending) => {
                    state.status = TabStatus::Completed;
                    state.pending_since_at = None;
                    state.completed_at = Some(now_ms);
                }
                None => state.status = TabStatus::Neutral,
                Some(_) => {}
            }
        }

        let change = StatusChange {
            tab_id,
            previous,
            current: state.status,
            site_key: state.site_key.clone(),
            site_name: state.site_name.clone(),
        };
        if change.changed() {
            debug!(
                target: "readyai::aggregator",
                "{} {} -> {} ({})",
                tab_id,
                previous.map_or_else(|| "untracked".to_string(), |s| s.to_string()),
                change.current,
                change.site_key
            );
        } else {
            trace!(target: "readyai::aggregator", "{} {} report from {}", tab_id, change.current, frame_id);
        }
        change
    }

    /// Downgrade COMPLETED to NEUTRAL. `None` if there was nothing to acknowledge.
    pub fn acknowledge(&mut self, tab_id: TabId) -> Option<StatusChange> {
        let entry = self.tabs.get_mut(&tab_id)?;
        if entry.state.status != TabStatus::Completed {
            return None;
        }
        entry.state.status = TabStatus::Neutral;
        entry.state.completed_at = None;
        debug!(target: "readyai::aggregator", "{} acknowledged", tab_id);
        Some(StatusChange {
            tab_id,
            previous: Some(TabStatus::Completed),
            current: TabStatus::Neutral,
            site_key: entry.state.site_key.clone(),
            site_name: entry.state.site_name.clone(),
        })
    }

    /// Purge frame and tab state together.
    pub fn remove_tab(&mut self, tab_id: TabId) -> bool {
        let removed = self.tabs.remove(&tab_id).is_some();
        if removed {
            debug!(target: "readyai::aggregator", "{} purged", tab_id);
        }
        removed
    }

    /// Track a tab as NEUTRAL before any frame has reported. No-op if already tracked.
    pub fn seed_neutral(&mut self, tab_id: TabId, site_key: &str, site_name: &str) -> bool {
        if self.tabs.contains_key(&tab_id) {
            return false;
        }
        self.tabs.insert(
            tab_id,
            TabEntry {
                state: TabState::neutral(site_key, site_name),
                frames: HashMap::new(),
            },
        );
        true
    }

    pub fn status(&self, tab_id: TabId) -> Option<TabStatus> {
        self.tabs.get(&tab_id).map(|e| e.state.status)
    }

    pub fn tab_state(&self, tab_id: TabId) -> Option<&TabState> {
        self.tabs.get(&tab_id).map(|e| &e.state)
    }

    pub fn is_tracked(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn tracked_tabs(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Record a probe nudge. False if the tab is not tracked.
    pub fn record_nudge(&mut self, tab_id: TabId, now_ms: u64) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(entry) => {
                entry.state.last_nudge_at = Some(now_ms);
                true
            }
            None => false,
        }
    }

    /// The tab that most recently entered COMPLETED and is still unread.
    pub fn most_recent_completed(&self) -> Option<TabId> {
        self.tabs
            .iter()
            .filter(|(_, e)| e.state.status == TabStatus::Completed)
            .max_by_key(|(id, e)| (e.state.completed_at, Reverse(**id)))
            .map(|(id, _)| *id)
    }

    pub fn snapshot(&self) -> Vec<TabSnapshot> {
        let mut tabs: Vec<TabSnapshot> = self
            .tabs
            .iter()
            .map(|(id, entry)| TabSnapshot {
                tab_id: *id,
                status: entry.state.status,
                site_key: entry.state.site_key.clone(),
                site_name: entry.state.site_name.clone(),
                pending_since_at: entry.state.pending_since_at,
                last_nudge_at: entry.state.last_nudge_at,
                completed_at: entry.state.completed_at,
                frame_count: entry.frames.len(),
                generating_frames: entry.frames.values().filter(|f| f.is_generating).count(),
            })
            .collect();
        tabs.sort_by_key(|t| t.tab_id);
        tabs
    }
}
