//! Site identities and the built-in site registry.
//!
//! A site is resolved from a URL once per frame monitor and stays fixed for
//! the lifetime of that monitor. Built-in sites ship with the extension and
//! can only be toggled; custom sites are fully user-defined.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which detection rule a site uses to decide "generation in progress".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DetectionMode {
    /// `[data-testid="stop-button"]` visibility.
    ChatGpt,
    /// Stop/중지 aria-label across open shadow roots.
    Gemini,
    /// Stop buttons, run-button relabels, stop icons and progress indicators.
    AiStudio,
    /// Buttons whose text contains "Stop".
    Claude,
    /// Any visible button labelled stop/cancel/abort (or the Korean equivalents).
    #[default]
    GenericStop,
}

impl DetectionMode {
    /// All modes, in the order they are offered to the user.
    pub const ALL: [DetectionMode; 5] = [
        DetectionMode::ChatGpt,
        DetectionMode::Gemini,
        DetectionMode::AiStudio,
        DetectionMode::Claude,
        DetectionMode::GenericStop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::ChatGpt => "chatgpt",
            DetectionMode::Gemini => "gemini",
            DetectionMode::AiStudio => "aistudio",
            DetectionMode::Claude => "claude",
            DetectionMode::GenericStop => "generic_stop",
        }
    }

    /// Human-readable label for settings UIs.
    pub fn label(self) -> &'static str {
        match self {
            DetectionMode::ChatGpt => "ChatGPT 전용",
            DetectionMode::Gemini => "Gemini 전용",
            DetectionMode::AiStudio => "AI Studio 전용",
            DetectionMode::Claude => "Claude 전용",
            DetectionMode::GenericStop => "범용(Stop/중지 버튼)",
        }
    }

    /// Whether this mode must search open shadow roots, not just the document.
    pub fn uses_deep_search(self) -> bool {
        matches!(self, DetectionMode::Gemini | DetectionMode::AiStudio)
    }

    /// Parse a mode name. Unknown names fall back to [`DetectionMode::GenericStop`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "chatgpt" => DetectionMode::ChatGpt,
            "gemini" => DetectionMode::Gemini,
            "aistudio" => DetectionMode::AiStudio,
            "claude" => DetectionMode::Claude,
            _ => DetectionMode::GenericStop,
        }
    }
}

impl From<String> for DetectionMode {
    fn from(value: String) -> Self {
        DetectionMode::from_name(&value)
    }
}

impl From<DetectionMode> for String {
    fn from(value: DetectionMode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved site: what a frame is monitoring and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIdentity {
    /// Built-in key (e.g. "gemini") or the custom site id.
    pub key: String,
    /// Display name used in notifications.
    pub name: String,
    /// Detection rule.
    pub detection: DetectionMode,
    /// URL match patterns the site was resolved from.
    pub url_patterns: Vec<String>,
    /// True for user-defined sites.
    pub is_custom: bool,
}

impl SiteIdentity {
    /// Sites whose completion UI lags while the tab is in the background.
    ///
    /// These are the only tabs the idle probe scheduler touches.
    pub fn under_reports_when_backgrounded(&self) -> bool {
        self.key == "gemini" || self.detection == DetectionMode::Gemini
    }
}

/// A user-defined site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSite {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "patterns")]
    pub url_patterns: Vec<String>,
    #[serde(default, alias = "detectionMode")]
    pub detection: DetectionMode,
    #[serde(default)]
    pub enabled: bool,
}

impl CustomSite {
    pub fn identity(&self) -> SiteIdentity {
        SiteIdentity {
            key: self.id.clone(),
            name: self.name.clone(),
            detection: self.detection,
            url_patterns: self.url_patterns.clone(),
            is_custom: true,
        }
    }
}

/// A site that ships with the extension.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuiltinSite {
    pub key: &'static str,
    pub name: &'static str,
    pub patterns: &'static [&'static str],
    pub detection: DetectionMode,
    pub default_enabled: bool,
}

impl BuiltinSite {
    pub fn identity(&self) -> SiteIdentity {
        SiteIdentity {
            key: self.key.to_string(),
            name: self.name.to_string(),
            detection: self.detection,
            url_patterns: self.patterns.iter().map(|p| p.to_string()).collect(),
            is_custom: false,
        }
    }
}

/// Built-in registry, in resolution order.
pub const BUILTIN_SITES: &[BuiltinSite] = &[
    BuiltinSite {
        key: "chatgpt",
        name: "ChatGPT",
        patterns: &["https://chatgpt.com/*", "https://chat.openai.com/*"],
        detection: DetectionMode::ChatGpt,
        default_enabled: true,
    },
    BuiltinSite {
        key: "gemini",
        name: "Gemini",
        patterns: &["https://gemini.google.com/*"],
        detection: DetectionMode::Gemini,
        default_enabled: true,
    },
    BuiltinSite {
        key: "aistudio",
        name: "AI Studio",
        patterns: &["https://aistudio.google.com/*"],
        detection: DetectionMode::AiStudio,
        default_enabled: false,
    },
    BuiltinSite {
        key: "claude",
        name: "Claude",
        patterns: &["https://claude.ai/*"],
        detection: DetectionMode::Claude,
        default_enabled: false,
    },
    BuiltinSite {
        key: "perplexity",
        name: "Perplexity",
        patterns: &["https://www.perplexity.ai/*", "https://perplexity.ai/*"],
        detection: DetectionMode::GenericStop,
        default_enabled: false,
    },
    BuiltinSite {
        key: "poe",
        name: "Poe",
        patterns: &["https://poe.com/*"],
        detection: DetectionMode::GenericStop,
        default_enabled: false,
    },
    BuiltinSite {
        key: "copilot",
        name: "Copilot",
        patterns: &["https://copilot.microsoft.com/*"],
        detection: DetectionMode::GenericStop,
        default_enabled: false,
    },
];

/// Look up a built-in site by key.
pub fn builtin_site(key: &str) -> Option<&'static BuiltinSite> {
    BUILTIN_SITES.iter().find(|s| s.key == key)
}

/// Enable flags for every built-in site, at their defaults.
pub fn default_enabled_sites() -> BTreeMap<String, bool> {
    BUILTIN_SITES
        .iter()
        .map(|s| (s.key.to_string(), s.default_enabled))
        .collect()
}
