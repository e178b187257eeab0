//! Persisted extension settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::{default_enabled_sites, CustomSite};

/// Minimum idle-probe period (the browser alarm granularity).
pub const PROBE_MIN_PERIOD_MIN: f64 = 1.0;
/// Maximum idle-probe period.
pub const PROBE_MAX_PERIOD_MIN: f64 = 60.0;
/// Minimum gap between two nudges of the same tab. Not user-configurable.
pub const PROBE_NUDGE_COOLDOWN_MS: u64 = 30_000;

/// User settings, as stored under their legacy key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Suppress desktop notifications.
    #[serde(default)]
    pub dnd_mode: bool,
    /// Show the toolbar badge.
    #[serde(default = "default_true")]
    pub badge_enabled: bool,
    /// Enable flag per built-in site key.
    #[serde(default = "default_enabled_sites")]
    pub enabled_sites: BTreeMap<String, bool>,
    /// User-defined sites.
    #[serde(default)]
    pub custom_sites: Vec<CustomSite>,
    /// Periodic re-check of background tabs that under-report completion.
    #[serde(default = "default_true", alias = "geminiProbeEnabled")]
    pub probe_enabled: bool,
    /// Probe period in minutes.
    #[serde(default = "default_probe_period_min", alias = "geminiProbePeriodMin")]
    pub probe_period_min: f64,
    /// Only switch tabs while the system is idle or locked.
    #[serde(default = "default_true", alias = "geminiProbeOnlyIdle")]
    pub probe_only_idle: bool,
    /// Idle threshold in seconds.
    #[serde(default = "default_probe_idle_sec", alias = "geminiProbeIdleSec")]
    pub probe_idle_sec: u32,
    /// Minimum PENDING age before a tab may be nudged, in seconds.
    #[serde(default = "default_probe_min_pending_sec", alias = "geminiProbeMinOrangeSec")]
    pub probe_min_pending_sec: u32,
}

fn default_true() -> bool {
    true
}

fn default_probe_period_min() -> f64 {
    1.0
}

fn default_probe_idle_sec() -> u32 {
    60
}

fn default_probe_min_pending_sec() -> u32 {
    12
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dnd_mode: false,
            badge_enabled: true,
            enabled_sites: default_enabled_sites(),
            custom_sites: Vec::new(),
            probe_enabled: true,
            probe_period_min: default_probe_period_min(),
            probe_only_idle: true,
            probe_idle_sec: default_probe_idle_sec(),
            probe_min_pending_sec: default_probe_min_pending_sec(),
        }
    }
}

impl Settings {
    /// Clamp numeric fields into range and fill missing built-in site flags.
    pub fn clamped(mut self) -> Self {
        self.probe_period_min = if self.probe_period_min.is_finite() {
            self.probe_period_min
                .clamp(PROBE_MIN_PERIOD_MIN, PROBE_MAX_PERIOD_MIN)
        } else {
            default_probe_period_min()
        };
        self.probe_idle_sec = self.probe_idle_sec.clamp(15, 3600);
        self.probe_min_pending_sec = self.probe_min_pending_sec.clamp(3, 600);
        for (key, enabled) in default_enabled_sites() {
            self.enabled_sites.entry(key).or_insert(enabled);
        }
        self
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_secs_f64(
            self.probe_period_min
                .clamp(PROBE_MIN_PERIOD_MIN, PROBE_MAX_PERIOD_MIN)
                * 60.0,
        )
    }

    pub fn probe_min_pending_ms(&self) -> u64 {
        u64::from(self.probe_min_pending_sec) * 1000
    }

    pub fn is_builtin_enabled(&self, key: &str) -> bool {
        self.enabled_sites.get(key).copied().unwrap_or(false)
    }

    /// True if the set of monitored sites differs between the two settings.
    pub fn sites_differ(&self, other: &Settings) -> bool {
        self.enabled_sites != other.enabled_sites || self.custom_sites != other.custom_sites
    }
}
