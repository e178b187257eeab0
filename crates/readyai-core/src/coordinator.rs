//! Background coordinator: routes frame messages into the aggregator and
//! drives the indicator and notification sinks.

use crate::aggregator::{FrameReport, StatusChange, TabAggregator};
use crate::clock::Clock;
use crate::host::{BrowserHost, IndicatorSink, NotificationSink};
use crate::sites::{make_custom_id, validate_custom_site, validate_settings, SiteResolver};
use crate::{ReadyAiError, Result};
use readyai_types::{
    builtin_site, BackgroundMessage, CustomSite, FrameId, FrameMessage, Indicator, Notification,
    Settings, SiteIdentity, TabId, TabInfo, TabSnapshot, TabState, TabStatus,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

pub const NOTIFICATION_ICON: &str = "assets/bell_notice.png";
pub const NOTIFICATION_BODY: &str = "작업이 완료되었습니다. 확인하려면 클릭하세요.";

/// Build the completion notification for a tab.
pub fn notification_for(tab_id: TabId, site_key: &str, site_name: &str) -> Notification {
    let title = match site_name.trim() {
        "" => match builtin_site(site_key) {
            Some(site) => format!("{} 답변 완료", site.name),
            None => "AI 답변 완료".to_string(),
        },
        name => format!("{} 답변 완료", name),
    };
    Notification {
        title,
        message: NOTIFICATION_BODY.to_string(),
        icon_path: NOTIFICATION_ICON.to_string(),
        tab_id,
    }
}

/// Frames of tabs the host has not announced yet, or without a URL, are
/// trusted; everything else must still resolve to a monitored site.
fn accepts_reports(resolver: &SiteResolver, url: Option<&str>) -> bool {
    match url {
        Some(url) if !url.is_empty() => resolver.is_monitored(url),
        _ => true,
    }
}

pub struct Coordinator<H: BrowserHost> {
    host: Arc<H>,
    indicators: Arc<dyn IndicatorSink>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    aggregator: Mutex<TabAggregator>,
    settings: watch::Sender<Settings>,
    resolver: RwLock<SiteResolver>,
    edit_lock: Mutex<()>,
}

impl<H: BrowserHost> Coordinator<H> {
    pub fn new(
        host: Arc<H>,
        indicators: Arc<dyn IndicatorSink>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Self {
        let settings = settings.clamped();
        let resolver = SiteResolver::new(&settings);
        let (settings_tx, _) = watch::channel(settings);
        Self {
            host,
            indicators,
            notifications,
            clock,
            aggregator: Mutex::new(TabAggregator::new()),
            settings: settings_tx,
            resolver: RwLock::new(resolver),
            edit_lock: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.settings.subscribe()
    }

    pub async fn resolver(&self) -> SiteResolver {
        self.resolver.read().await.clone()
    }

    pub async fn resolve(&self, url: &str) -> Option<SiteIdentity> {
        self.resolver.read().await.resolve(url)
    }

    // ========================================================================
    // Frame messages
    // ========================================================================

    /// Route one message from a frame monitor. Returns the reply, if any.
    pub async fn handle_frame_message(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        message: FrameMessage,
    ) -> Option<BackgroundMessage> {
        match message {
            FrameMessage::ReportStatus {
                is_generating,
                site_key,
                site_name,
            } => {
                self.report_status(
                    tab_id,
                    frame_id,
                    FrameReport::new(is_generating, site_key, site_name),
                )
                .await;
                None
            }
            FrameMessage::Acknowledge { .. } => {
                self.acknowledge(tab_id).await;
                None
            }
            FrameMessage::GetActiveTabUrl => Some(BackgroundMessage::ActiveTabUrl {
                url: self.active_tab_url(tab_id).await,
            }),
            FrameMessage::CheckReceived { reason } => {
                trace!(target: "readyai::coordinator", "{} {} confirmed check ({})", tab_id, frame_id, reason);
                None
            }
            FrameMessage::Pong => {
                trace!(target: "readyai::coordinator", "{} {} is alive", tab_id, frame_id);
                None
            }
        }
    }

    /// Apply a frame report. The status transition and the indicator update
    /// happen under one aggregator lock. Reports from a tab whose URL is no
    /// longer monitored are dropped and yield `None`.
    pub async fn report_status(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        report: FrameReport,
    ) -> Option<StatusChange> {
        let url = self.host.tab(tab_id).await.map(|tab| tab.url);
        let settings = self.settings();
        let change = {
            // Held across the update so a settings change cannot slip between
            // the check and the write.
            let resolver = self.resolver.read().await;
            if !accepts_reports(&resolver, url.as_deref()) {
                debug!(
                    target: "readyai::coordinator",
                    "Dropped report from {} {}: site no longer monitored",
                    tab_id,
                    frame_id
                );
                return None;
            }
            let mut aggregator = self.aggregator.lock().await;
            let change = aggregator.apply_report(tab_id, frame_id, report, self.clock.now_ms());
            if change.changed() {
                self.push_indicator(tab_id, change.current, &settings);
            }
            change
        };

        if change.completed() {
            self.notify_completion(&change, &settings).await;
        }
        Some(change)
    }

    async fn notify_completion(&self, change: &StatusChange, settings: &Settings) {
        if settings.dnd_mode {
            debug!(target: "readyai::coordinator", "{} completed; do-not-disturb is on", change.tab_id);
            return;
        }
        let active = self
            .host
            .tab(change.tab_id)
            .await
            .is_some_and(|tab| tab.active);
        if active {
            debug!(target: "readyai::coordinator", "{} completed while in front", change.tab_id);
            return;
        }

        info!(
            target: "readyai::coordinator",
            "{} finished generating on {}",
            change.tab_id,
            change.site_key
        );
        self.notifications
            .notify(notification_for(change.tab_id, &change.site_key, &change.site_name));
    }

    /// Relay an acknowledgment. True if a COMPLETED tab went back to NEUTRAL.
    pub async fn acknowledge(&self, tab_id: TabId) -> bool {
        let url = self.host.tab(tab_id).await.map(|tab| tab.url);
        let settings = self.settings();
        let resolver = self.resolver.read().await;
        if !accepts_reports(&resolver, url.as_deref()) {
            debug!(target: "readyai::coordinator", "Dropped acknowledgment from {}", tab_id);
            return false;
        }
        let mut aggregator = self.aggregator.lock().await;
        match aggregator.acknowledge(tab_id) {
            Some(change) => {
                self.push_indicator(tab_id, change.current, &settings);
                true
            }
            None => false,
        }
    }

    pub async fn active_tab_url(&self, tab_id: TabId) -> String {
        self.host
            .tab(tab_id)
            .await
            .map(|tab| tab.url)
            .unwrap_or_default()
    }

    fn push_indicator(&self, tab_id: TabId, status: TabStatus, settings: &Settings) {
        self.indicators
            .set_indicator(tab_id, Indicator::from(status), settings.badge_enabled);
    }

    // ========================================================================
    // Tab lifecycle
    // ========================================================================

    pub async fn tab_removed(&self, tab_id: TabId) {
        self.aggregator.lock().await.remove_tab(tab_id);
        self.indicators.forget_tab(tab_id);
    }

    /// Seed, repair and poke every open tab on a monitored site.
    pub async fn kick_all_tabs(&self, reason: &str) -> usize {
        let tabs = self.host.list_tabs().await;
        let targets: Vec<(TabInfo, SiteIdentity)> = {
            let resolver = self.resolver.read().await;
            tabs.into_iter()
                .filter_map(|tab| resolver.resolve(&tab.url).map(|site| (tab, site)))
                .collect()
        };

        let settings = self.settings();
        for (tab, site) in &targets {
            let seeded = self
                .aggregator
                .lock()
                .await
                .seed_neutral(tab.id, &site.key, &site.name);
            if seeded {
                self.push_indicator(tab.id, TabStatus::Neutral, &settings);
            }

            self.ensure_monitor(tab).await;
            self.host
                .send_to_tab(tab.id, BackgroundMessage::force_check(reason))
                .await;
        }

        info!(
            target: "readyai::coordinator",
            "Kicked {} monitored tabs ({})",
            targets.len(),
            reason
        );
        targets.len()
    }

    /// Make sure a monitored tab has a live frame monitor, injecting one if the ping goes unanswered.
    pub async fn ensure_monitor(&self, tab: &TabInfo) -> bool {
        if tab.url.is_empty() || self.resolve(&tab.url).await.is_none() {
            return false;
        }
        if self.host.send_to_tab(tab.id, BackgroundMessage::Ping).await {
            return true;
        }

        if let Err(e) = self.host.inject_monitor(tab.id).await {
            debug!(target: "readyai::coordinator", "Could not inject monitor into {}: {}", tab.id, e);
            return false;
        }
        self.host
            .send_to_tab(tab.id, BackgroundMessage::force_check("inject"))
            .await;
        true
    }

    /// Focus the most recently completed tab. Does not acknowledge it.
    pub async fn notification_clicked(&self) -> Option<TabId> {
        let tab_id = self.aggregator.lock().await.most_recent_completed()?;
        let Some(tab) = self.host.tab(tab_id).await else {
            debug!(target: "readyai::coordinator", "Completed {} is gone", tab_id);
            return None;
        };

        if let Err(e) = self.host.activate_tab(tab_id).await {
            warn!(target: "readyai::coordinator", "Failed to activate {}: {}", tab_id, e);
            return None;
        }
        if let Err(e) = self.host.focus_window(tab.window_id).await {
            warn!(target: "readyai::coordinator", "Failed to focus {}: {}", tab.window_id, e);
        }
        Some(tab_id)
    }

    // ========================================================================
    // Inspection (used by the probe scheduler and the API)
    // ========================================================================

    pub async fn snapshot(&self) -> Vec<TabSnapshot> {
        self.aggregator.lock().await.snapshot()
    }

    pub async fn tab_status(&self, tab_id: TabId) -> Option<TabStatus> {
        self.aggregator.lock().await.status(tab_id)
    }

    pub async fn tab_state(&self, tab_id: TabId) -> Option<TabState> {
        self.aggregator.lock().await.tab_state(tab_id).cloned()
    }

    pub async fn record_nudge(&self, tab_id: TabId) -> bool {
        let now = self.clock.now_ms();
        self.aggregator.lock().await.record_nudge(tab_id, now)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Validate and apply new settings. Invalid settings change nothing.
    pub async fn apply_settings(&self, settings: Settings) -> Result<Settings> {
        let _edit = self.edit_lock.lock().await;
        self.apply_locked(settings).await
    }

    async fn apply_locked(&self, settings: Settings) -> Result<Settings> {
        let settings = validate_settings(settings)?;
        let previous = self.settings.send_replace(settings.clone());

        if previous.badge_enabled != settings.badge_enabled {
            if settings.badge_enabled {
                self.refresh_tracked_indicators(&settings).await;
            } else {
                self.clear_all_badges().await;
            }
        }

        if previous.sites_differ(&settings) {
            *self.resolver.write().await = SiteResolver::new(&settings);
            self.broadcast_sites(&settings).await;
            self.reconcile_sites().await;
            self.kick_all_tabs("settings").await;
        }

        info!(target: "readyai::settings", "Settings applied");
        Ok(settings)
    }

    /// Drop state for tabs that no longer resolve to a monitored site.
    pub async fn reconcile_sites(&self) -> Vec<TabId> {
        let tabs = self.host.list_tabs().await;
        let settings = self.settings();
        let resolver = self.resolver.read().await;
        let mut aggregator = self.aggregator.lock().await;

        let mut purged = Vec::new();
        for tab in tabs {
            if !aggregator.is_tracked(tab.id) || tab.url.is_empty() || resolver.is_monitored(&tab.url) {
                continue;
            }
            aggregator.remove_tab(tab.id);
            self.push_indicator(tab.id, TabStatus::Neutral, &settings);
            purged.push(tab.id);
        }

        if !purged.is_empty() {
            info!(target: "readyai::coordinator", "Stopped tracking {} tabs", purged.len());
        }
        purged
    }

    /// Tell every frame monitor to re-resolve its site.
    async fn broadcast_sites(&self, settings: &Settings) {
        let message = BackgroundMessage::sites_changed(settings);
        for tab in self.host.list_tabs().await {
            self.host.send_to_tab(tab.id, message.clone()).await;
        }
    }

    async fn refresh_tracked_indicators(&self, settings: &Settings) {
        for tab in self.aggregator.lock().await.snapshot() {
            self.push_indicator(tab.tab_id, tab.status, settings);
        }
    }

    async fn clear_all_badges(&self) {
        for tab in self.host.list_tabs().await {
            self.indicators.clear_badge(tab.id);
        }
    }

    pub async fn add_custom_site(&self, mut site: CustomSite) -> Result<CustomSite> {
        let _edit = self.edit_lock.lock().await;
        if site.id.trim().is_empty() {
            site.id = make_custom_id();
        }
        let site = validate_custom_site(site)?;

        let mut settings = self.settings();
        if settings.custom_sites.iter().any(|s| s.id == site.id) {
            return Err(ReadyAiError::InvalidCustomSite(format!(
                "duplicate id '{}'",
                site.id
            )));
        }
        settings.custom_sites.push(site.clone());
        self.apply_locked(settings).await?;
        info!(target: "readyai::sites", "Added custom site {} ({})", site.name, site.id);
        Ok(site)
    }

    pub async fn remove_custom_site(&self, id: &str) -> Result<()> {
        let _edit = self.edit_lock.lock().await;
        let mut settings = self.settings();
        let before = settings.custom_sites.len();
        settings.custom_sites.retain(|s| s.id != id);
        if settings.custom_sites.len() == before {
            return Err(ReadyAiError::CustomSiteNotFound(id.to_string()));
        }
        self.apply_locked(settings).await?;
        info!(target: "readyai::sites", "Removed custom site {}", id);
        Ok(())
    }

    /// Toggle a built-in site by key or a custom site by id.
    pub async fn set_site_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        let _edit = self.edit_lock.lock().await;
        let mut settings = self.settings();
        if builtin_site(key).is_some() {
            settings.enabled_sites.insert(key.to_string(), enabled);
        } else if let Some(site) = settings.custom_sites.iter_mut().find(|s| s.id == key) {
            site.enabled = enabled;
        } else {
            return Err(ReadyAiError::UnknownSite(key.to_string()));
        }
        self.apply_locked(settings).await?;
        Ok(())
    }
}
