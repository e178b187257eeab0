//! Shared application state.

use crate::bridge::HostBridge;
use crate::config::Config;
use crate::settings_store::SettingsStore;
use readyai_core::{Coordinator, SystemClock};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub bridge: Arc<HostBridge>,
    pub coordinator: Arc<Coordinator<HostBridge>>,
    pub settings_store: SettingsStore,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> readyai_core::Result<Self> {
        let settings_store = SettingsStore::new(&config.settings_path);
        let settings = settings_store.load()?;

        let bridge = Arc::new(HostBridge::new());
        let coordinator = Arc::new(Coordinator::new(
            bridge.clone(),
            bridge.clone(),
            bridge.clone(),
            Arc::new(SystemClock),
            settings,
        ));

        Ok(Self {
            bridge,
            coordinator,
            settings_store,
            config,
        })
    }

    /// Persist whatever the coordinator currently holds.
    pub fn persist_settings(&self) -> readyai_core::Result<()> {
        self.settings_store.save(&self.coordinator.settings())
    }
}
