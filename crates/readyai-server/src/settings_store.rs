//! JSON persistence for extension settings.

use readyai_core::Result;
use readyai_types::Settings;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored settings. A missing file yields the defaults.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            debug!(target: "readyai::settings", "No settings at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings.clamped())
    }

    /// Replace the stored settings. The file is swapped in whole.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(target: "readyai::settings", "Saved settings to {}", self.path.display());
        Ok(())
    }
}
