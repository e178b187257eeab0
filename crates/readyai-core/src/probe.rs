//! Idle probe scheduler.
//!
//! Some sites stop updating their completion UI while the tab is in the
//! background. Every probe period the scheduler asks those tabs to re-check,
//! and if one has been PENDING for too long it briefly brings that tab to the
//! front so the page catches up.

use crate::coordinator::Coordinator;
use crate::host::BrowserHost;
use readyai_types::{
    BackgroundMessage, Settings, TabId, TabState, TabStatus, WindowId, PROBE_NUDGE_COOLDOWN_MS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Pause between activating a tab and re-checking it, and again before restoring.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(320);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeCandidate {
    pub tab_id: TabId,
    pub window_id: WindowId,
    pub pending_since_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDecision {
    /// The probe is switched off in settings.
    Disabled,
    /// No tab qualified for a nudge.
    NoCandidates,
    /// Candidates existed but the user is at the keyboard.
    NotIdle,
    /// The tab was brought to the front and re-checked.
    Nudged(TabId),
    /// The tab left PENDING before the nudge started; only a re-check was sent.
    Skipped(TabId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Tabs that were sent a plain re-check this tick.
    pub rechecked: Vec<TabId>,
    pub decision: ProbeDecision,
}

/// Whether a tab may be nudged right now.
pub fn is_nudge_eligible(state: &TabState, tab_active: bool, now_ms: u64, min_pending_ms: u64) -> bool {
    if state.status != TabStatus::Pending || tab_active {
        return false;
    }
    let Some(since) = state.pending_since_at else {
        return false;
    };
    let old_enough = now_ms.saturating_sub(since) >= min_pending_ms;
    let cooled_down = state
        .last_nudge_at
        .is_none_or(|at| now_ms.saturating_sub(at) >= PROBE_NUDGE_COOLDOWN_MS);
    old_enough && cooled_down
}

/// The candidate that has been PENDING the longest. Equal ages go to the lowest tab id.
pub fn select_nudge_target(candidates: &[NudgeCandidate]) -> Option<NudgeCandidate> {
    candidates
        .iter()
        .min_by_key(|c| (c.pending_since_at, c.tab_id))
        .copied()
}

pub struct IdleProbeScheduler<H: BrowserHost> {
    coordinator: Arc<Coordinator<H>>,
    settle_delay: Duration,
}

impl<H: BrowserHost> IdleProbeScheduler<H> {
    pub fn new(coordinator: Arc<Coordinator<H>>) -> Self {
        Self::with_settle_delay(coordinator, DEFAULT_SETTLE_DELAY)
    }

    pub fn with_settle_delay(coordinator: Arc<Coordinator<H>>, settle_delay: Duration) -> Self {
        Self {
            coordinator,
            settle_delay,
        }
    }

    /// Run one probe pass.
    pub async fn tick(&self) -> ProbeOutcome {
        let settings = self.coordinator.settings();
        if !settings.probe_enabled {
            return ProbeOutcome {
                rechecked: Vec::new(),
                decision: ProbeDecision::Disabled,
            };
        }

        let host = self.coordinator.host();
        let mut rechecked = Vec::new();
        let mut candidates = Vec::new();
        let min_pending_ms = settings.probe_min_pending_ms();

        for tab in host.list_tabs().await {
            if tab.url.is_empty() {
                continue;
            }
            let lagging = self
                .coordinator
                .resolve(&tab.url)
                .await
                .is_some_and(|site| site.under_reports_when_backgrounded());
            if !lagging {
                continue;
            }

            host.send_to_tab(tab.id, BackgroundMessage::force_check("probe_tick"))
                .await;
            rechecked.push(tab.id);

            let Some(state) = self.coordinator.tab_state(tab.id).await else {
                continue;
            };
            let now = self.coordinator.now_ms();
            if is_nudge_eligible(&state, tab.active, now, min_pending_ms) {
                if let Some(pending_since_at) = state.pending_since_at {
                    candidates.push(NudgeCandidate {
                        tab_id: tab.id,
                        window_id: tab.window_id,
                        pending_since_at,
                    });
                }
            }
        }

        let decision = self.decide(&settings, &candidates).await;
        debug!(
            target: "readyai::probe",
            "Probe tick: rechecked {} tabs, {:?}",
            rechecked.len(),
            decision
        );
        ProbeOutcome {
            rechecked,
            decision,
        }
    }

    async fn decide(&self, settings: &Settings, candidates: &[NudgeCandidate]) -> ProbeDecision {
        let Some(target) = select_nudge_target(candidates) else {
            return ProbeDecision::NoCandidates;
        };

        if settings.probe_only_idle {
            let state = self
                .coordinator
                .host()
                .idle_state(settings.probe_idle_sec)
                .await;
            if !state.is_away() {
                return ProbeDecision::NotIdle;
            }
        }

        self.nudge(target.tab_id, target.window_id).await
    }

    /// Bring `tab_id` to the front, re-check it, and put the previous tab back.
    pub async fn nudge(&self, tab_id: TabId, window_id: WindowId) -> ProbeDecision {
        let host = self.coordinator.host();

        if self.coordinator.tab_status(tab_id).await != Some(TabStatus::Pending) {
            host.send_to_tab(tab_id, BackgroundMessage::force_check("probe_nudge_skipped"))
                .await;
            return ProbeDecision::Skipped(tab_id);
        }

        let restore = host.active_tab(window_id).await.map(|tab| tab.id);

        if let Err(e) = host.activate_tab(tab_id).await {
            warn!(target: "readyai::probe", "Could not activate {}: {}", tab_id, e);
            host.send_to_tab(tab_id, BackgroundMessage::force_check("probe_nudge_skipped"))
                .await;
            return ProbeDecision::Skipped(tab_id);
        }
        sleep(self.settle_delay).await;

        host.send_to_tab(tab_id, BackgroundMessage::force_check("probe_nudge"))
            .await;
        sleep(self.settle_delay).await;

        if let Some(restore) = restore.filter(|id| *id != tab_id) {
            if let Err(e) = host.activate_tab(restore).await {
                warn!(target: "readyai::probe", "Could not restore {}: {}", restore, e);
            }
        }

        self.coordinator.record_nudge(tab_id).await;
        info!(target: "readyai::probe", "Nudged {}", tab_id);
        ProbeDecision::Nudged(tab_id)
    }

    /// Run the probe on its configured period until the settings channel closes.
    /// Toggling the probe or changing its period restarts the countdown.
    pub fn spawn(self, mut settings_rx: watch::Receiver<Settings>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut current = settings_rx.borrow_and_update().clone();
            let mut deadline = Instant::now() + current.probe_period();

            loop {
                tokio::select! {
                    _ = sleep_until(deadline), if current.probe_enabled => {
                        self.tick().await;
                        deadline = Instant::now() + current.probe_period();
                    }
                    changed = settings_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = settings_rx.borrow_and_update().clone();
                        if next.probe_enabled != current.probe_enabled
                            || next.probe_period() != current.probe_period()
                        {
                            deadline = Instant::now() + next.probe_period();
                            debug!(
                                target: "readyai::probe",
                                "Probe rescheduled (enabled: {}, period: {:?})",
                                next.probe_enabled,
                                next.probe_period()
                            );
                        }
                        current = next;
                    }
                }
            }
            debug!(target: "readyai::probe", "Probe scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::testing::{tab, HostCall, Harness};
    use crate::FrameReport;
    use readyai_types::{FrameId, IdleState};

    const GEMINI_URL: &str = "https://gemini.google.com/app/abc";

    fn pending(since: u64, last_nudge: Option<u64>) -> TabState {
        TabState {
            status: TabStatus::Pending,
            pending_since_at: Some(since),
            last_nudge_at: last_nudge,
            ..TabState::neutral("gemini", "Gemini")
        }
    }

    /// Tab 1 is in front, tab 7 runs Gemini in the background.
    async fn pending_gemini() -> Harness {
        let h = Harness::new(
            vec![
                tab(1, 1, "https://example.com/", true),
                tab(7, 1, GEMINI_URL, false),
            ],
            Settings::default(),
        );
        h.coordinator
            .report_status(TabId(7), FrameId::TOP, FrameReport::new(true, "gemini", "Gemini"))
            .await;
        h.clock.advance(20_000);
        h.host.set_idle(IdleState::Idle);
        h
    }

    #[test]
    fn test_nudge_eligibility() {
        let now = 100_000;
        assert!(is_nudge_eligible(&pending(80_000, None), false, now, 12_000));
        // Too young.
        assert!(!is_nudge_eligible(&pending(95_000, None), false, now, 12_000));
        // Already in front.
        assert!(!is_nudge_eligible(&pending(80_000, None), true, now, 12_000));
        // Cooldown.
        assert!(!is_nudge_eligible(&pending(10_000, Some(80_000)), false, now, 12_000));
        assert!(is_nudge_eligible(&pending(10_000, Some(70_000)), false, now, 12_000));
        // Not pending.
        let neutral = TabState::neutral("gemini", "Gemini");
        assert!(!is_nudge_eligible(&neutral, false, now, 0));
    }

    #[test]
    fn test_select_oldest_then_lowest_id() {
        let c = |id, since| NudgeCandidate {
            tab_id: TabId(id),
            window_id: WindowId(1),
            pending_since_at: since,
        };
        assert_eq!(select_nudge_target(&[]), None);
        let picked = select_nudge_target(&[c(3, 500), c(9, 100), c(4, 100)]).unwrap();
        assert_eq!(picked.tab_id, TabId(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_nudges_once() {
        let h = pending_gemini().await;
        let probe = IdleProbeScheduler::new(h.coordinator.clone());

        let outcome = probe.tick().await;
        assert_eq!(outcome.decision, ProbeDecision::Nudged(TabId(7)));
        assert_eq!(outcome.rechecked, vec![TabId(7)]);
        assert_eq!(h.host.activations(), vec![TabId(7), TabId(1)]);
        assert_eq!(
            h.host.sent_to(TabId(7)),
            vec![
                BackgroundMessage::force_check("probe_tick"),
                BackgroundMessage::force_check("probe_nudge"),
            ]
        );
        assert_eq!(h.host.active_in(WindowId(1)), Some(TabId(1)));
        let state = h.coordinator.tab_state(TabId(7)).await.unwrap();
        assert_eq!(state.last_nudge_at, Some(h.clock.now_ms()));

        // Within the cooldown only the plain re-check goes out.
        h.host.clear_calls();
        h.clock.advance(10_000);
        let outcome = probe.tick().await;
        assert_eq!(outcome.decision, ProbeDecision::NoCandidates);
        assert!(h.host.activations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_user_blocks_nudge() {
        let h = pending_gemini().await;
        h.host.set_idle(IdleState::Active);
        let probe = IdleProbeScheduler::new(h.coordinator.clone());

        let outcome = probe.tick().await;
        assert_eq!(outcome.decision, ProbeDecision::NotIdle);
        assert_eq!(outcome.rechecked, vec![TabId(7)]);
        assert!(h.host.activations().is_empty());
        assert!(h.host.calls().contains(&HostCall::IdleQuery(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gate_can_be_disabled() {
        let h = pending_gemini().await;
        h.host.set_idle(IdleState::Active);
        let mut settings = h.coordinator.settings();
        settings.probe_only_idle = false;
        h.coordinator.apply_settings(settings).await.unwrap();

        let outcome = IdleProbeScheduler::new(h.coordinator.clone()).tick().await;
        assert_eq!(outcome.decision, ProbeDecision::Nudged(TabId(7)));
        assert!(!h
            .host
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::IdleQuery(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_probe_does_nothing() {
        let h = pending_gemini().await;
        let mut settings = h.coordinator.settings();
        settings.probe_enabled = false;
        h.coordinator.apply_settings(settings).await.unwrap();
        h.host.clear_calls();

        let outcome = IdleProbeScheduler::new(h.coordinator.clone()).tick().await;
        assert_eq!(outcome.decision, ProbeDecision::Disabled);
        assert!(h.host.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_sites_are_not_probed() {
        let h = Harness::new(
            vec![tab(3, 1, "https://chatgpt.com/c/1", false)],
            Settings::default(),
        );
        h.coordinator
            .report_status(TabId(3), FrameId::TOP, FrameReport::new(true, "chatgpt", "ChatGPT"))
            .await;
        h.clock.advance(60_000);
        h.host.set_idle(IdleState::Locked);

        let outcome = IdleProbeScheduler::new(h.coordinator.clone()).tick().await;
        assert!(outcome.rechecked.is_empty());
        assert_eq!(outcome.decision, ProbeDecision::NoCandidates);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nudge_skips_tab_that_completed() {
        let h = pending_gemini().await;
        h.coordinator
            .report_status(TabId(7), FrameId::TOP, FrameReport::new(false, "gemini", "Gemini"))
            .await;
        h.host.clear_calls();

        let probe = IdleProbeScheduler::new(h.coordinator.clone());
        let decision = probe.nudge(TabId(7), WindowId(1)).await;
        assert_eq!(decision, ProbeDecision::Skipped(TabId(7)));
        assert!(h.host.activations().is_empty());
        assert_eq!(
            h.host.sent_to(TabId(7)),
            vec![BackgroundMessage::force_check("probe_nudge_skipped")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_scheduler_runs_on_period() {
        let h = pending_gemini().await;
        let handle = IdleProbeScheduler::new(h.coordinator.clone())
            .spawn(h.coordinator.subscribe_settings());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.host.sent_to(TabId(7)).is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.host.activations(), vec![TabId(7), TabId(1)]);

        handle.abort();
    }
}
