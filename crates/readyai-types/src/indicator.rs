//! Icon, badge and tab-title indicators.

use crate::TabStatus;
use serde::{Deserialize, Serialize};

/// Badge text shown whenever badges are enabled. Only the colour matters;
/// an empty string would hide the badge entirely.
pub const BADGE_PLACEHOLDER: &str = "1";

/// Three-state indicator pushed to the icon/badge sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Neutral,
    Pending,
    Completed,
}

/// Fixed presentation for one indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndicatorStyle {
    pub icon_path: &'static str,
    pub badge_background: &'static str,
    pub badge_text_color: &'static str,
}

impl Indicator {
    pub fn style(self) -> IndicatorStyle {
        match self {
            Indicator::Neutral => IndicatorStyle {
                icon_path: "assets/bell_profile.png",
                badge_background: "#FFFFFF",
                badge_text_color: "#000000",
            },
            Indicator::Pending => IndicatorStyle {
                icon_path: "assets/bell_pending.png",
                badge_background: "#FFA500",
                badge_text_color: "#FFFFFF",
            },
            Indicator::Completed => IndicatorStyle {
                icon_path: "assets/bell_unread.png",
                badge_background: "#7CFC00",
                badge_text_color: "#000000",
            },
        }
    }
}

impl From<TabStatus> for Indicator {
    fn from(status: TabStatus) -> Self {
        match status {
            TabStatus::Neutral => Indicator::Neutral,
            TabStatus::Pending => Indicator::Pending,
            TabStatus::Completed => Indicator::Completed,
        }
    }
}

/// Glyph prefixed to the tab title by the top frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleGlyph {
    Neutral,
    Pending,
    CompletedUnread,
}

const GLYPHS: [&str; 3] = ["⚪", "🟠", "🟢"];

impl TitleGlyph {
    pub fn as_str(self) -> &'static str {
        match self {
            TitleGlyph::Neutral => GLYPHS[0],
            TitleGlyph::Pending => GLYPHS[1],
            TitleGlyph::CompletedUnread => GLYPHS[2],
        }
    }

    /// Remove every leading glyph (each optionally followed by one space).
    pub fn strip(title: &str) -> &str {
        let mut rest = title;
        'outer: loop {
            for glyph in GLYPHS {
                if let Some(after) = rest.strip_prefix(glyph) {
                    rest = after.strip_prefix(' ').unwrap_or(after);
                    continue 'outer;
                }
            }
            return rest;
        }
    }

    /// The title as it should read with this glyph applied.
    pub fn decorate(self, title: &str) -> String {
        format!("{} {}", self.as_str(), Self::strip(title))
    }
}
