//! Completion-detection engine for Ready_Ai.

mod aggregator;
mod clock;
mod coordinator;
mod detector;
mod dom;
mod error;
mod host;
mod probe;
mod reporter;
mod roots;
mod sites;

#[cfg(test)]
mod testing;

pub use aggregator::{FrameReport, StatusChange, TabAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{notification_for, Coordinator};
pub use detector::detect;
pub use dom::{
    is_enabled_button_like, is_visible, query_all, ComputedStyle, Dom, ElementQuery, MemoryDom,
    NodeId, PageSnapshot, Rect, SnapshotElement,
};
pub use error::ReadyAiError;
pub use host::{BrowserHost, IndicatorSink, NotificationSink};
pub use probe::{
    is_nudge_eligible, select_nudge_target, IdleProbeScheduler, NudgeCandidate, ProbeDecision,
    ProbeOutcome, DEFAULT_SETTLE_DELAY,
};
pub use reporter::{
    FrameLink, FrameMonitorState, FrameReporter, ReportReason, ReporterConfig, UserInteraction,
};
pub use roots::SearchRoots;
pub use sites::{
    make_custom_id, normalize_patterns, validate_custom_site, validate_pattern,
    validate_settings, MatchPattern, SiteResolver,
};

/// Result type for Ready_Ai operations.
pub type Result<T> = std::result::Result<T, ReadyAiError>;
