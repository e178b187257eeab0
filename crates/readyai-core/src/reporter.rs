//! Frame reporter: one frame's detection loop.
//!
//! Detection runs on a fixed cadence and on mutation triggers, coalesced so
//! that at most one check runs per debounce gap. Reports go upward through a
//! [`FrameLink`] when the detected value changes, on the first pass, and on
//! heartbeat. The top frame also keeps the tab-title glyph in sync.

use crate::detector::detect;
use crate::dom::Dom;
use crate::roots::SearchRoots;
use crate::sites::SiteResolver;
use readyai_types::{BackgroundMessage, FrameMessage, Settings, SiteIdentity, TitleGlyph};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Upward channel from a frame to the background coordinator.
pub trait FrameLink: Send + Sync {
    /// Fire-and-forget. Returns false when the background is unreachable.
    fn send(&self, message: FrameMessage) -> bool;
}

impl FrameLink for mpsc::UnboundedSender<FrameMessage> {
    fn send(&self, message: FrameMessage) -> bool {
        mpsc::UnboundedSender::send(self, message).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Polling cadence.
    pub check_interval: Duration,
    /// Minimum gap between two detection passes.
    pub min_check_gap: Duration,
    /// Maximum silence before an unchanged status is re-sent.
    pub heartbeat: Duration,
    /// Only the top frame owns the tab title.
    pub is_top_frame: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(1200),
            min_check_gap: Duration::from_millis(50),
            heartbeat: Duration::from_secs(5),
            is_top_frame: true,
        }
    }
}

/// Why a report was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportReason {
    Changed,
    Initial,
    Heartbeat,
}

/// Per-frame reporting state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMonitorState {
    last_generating: bool,
    completion_acked: bool,
    has_sent_initial: bool,
    last_report_at: Option<u64>,
}

impl Default for FrameMonitorState {
    fn default() -> Self {
        Self {
            last_generating: false,
            completion_acked: true,
            has_sent_initial: false,
            last_report_at: None,
        }
    }
}

impl FrameMonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one detection result. Returns the reason to report, if any.
    pub fn on_detection(&mut self, generating: bool, now_ms: u64, heartbeat_ms: u64) -> Option<ReportReason> {
        let reason = if generating != self.last_generating {
            self.last_generating = generating;
            // Finishing leaves an unread completion; starting again clears it.
            self.completion_acked = generating;
            Some(ReportReason::Changed)
        } else if !self.has_sent_initial {
            Some(ReportReason::Initial)
        } else if self
            .last_report_at
            .is_none_or(|last| now_ms.saturating_sub(last) >= heartbeat_ms)
        {
            Some(ReportReason::Heartbeat)
        } else {
            None
        };

        if reason.is_some() {
            self.has_sent_initial = true;
            self.last_report_at = Some(now_ms);
        }
        reason
    }

    /// Mark an unread completion as seen. False if there was nothing to acknowledge.
    pub fn acknowledge(&mut self) -> bool {
        if self.last_generating || self.completion_acked {
            return false;
        }
        self.completion_acked = true;
        true
    }

    pub fn is_generating(&self) -> bool {
        self.last_generating
    }

    pub fn has_unread_completion(&self) -> bool {
        !self.last_generating && !self.completion_acked
    }

    pub fn glyph(&self) -> TitleGlyph {
        if self.last_generating {
            TitleGlyph::Pending
        } else if !self.completion_acked {
            TitleGlyph::CompletedUnread
        } else {
            TitleGlyph::Neutral
        }
    }
}

/// DOM events the reporter listens to for acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInteraction {
    Click,
    Scroll,
    Wheel,
    Focus,
    KeyDown,
}

impl UserInteraction {
    /// Only explicit interaction dismisses a completion; looking at the tab does not.
    pub fn acknowledges(self) -> bool {
        matches!(
            self,
            UserInteraction::Click | UserInteraction::Scroll | UserInteraction::Wheel
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Schedule,
    Force,
}

/// State shared between the reporter handle and its check task.
/// `open` is cleared by `stop`; nothing is sent or written once it is false.
struct MonitorCore<N> {
    open: bool,
    site: SiteIdentity,
    state: FrameMonitorState,
    roots: SearchRoots<N>,
}

fn lock<N>(core: &Mutex<MonitorCore<N>>) -> MutexGuard<'_, MonitorCore<N>> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveMonitor<N> {
    site: SiteIdentity,
    core: Arc<Mutex<MonitorCore<N>>>,
    signals: mpsc::UnboundedSender<Signal>,
    task: JoinHandle<()>,
}

struct CheckContext<D: Dom> {
    dom: Arc<D>,
    link: Arc<dyn FrameLink>,
    config: ReporterConfig,
    origin: Instant,
    core: Arc<Mutex<MonitorCore<D::Node>>>,
}

fn elapsed_ms(origin: Instant) -> u64 {
    u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn apply_glyph<D: Dom + ?Sized>(dom: &D, glyph: TitleGlyph) {
    let current = dom.title();
    let target = glyph.decorate(&current);
    if target != current {
        dom.set_title(&target);
    }
}

fn strip_glyph<D: Dom + ?Sized>(dom: &D) {
    let current = dom.title();
    let clean = TitleGlyph::strip(&current);
    if clean != current {
        dom.set_title(clean);
    }
}

fn run_check<D: Dom>(ctx: &CheckContext<D>) {
    let mut core = lock(&ctx.core);
    if !core.open {
        return;
    }
    let now = elapsed_ms(ctx.origin);
    let heartbeat_ms = u64::try_from(ctx.config.heartbeat.as_millis()).unwrap_or(u64::MAX);
    let MonitorCore {
        site, state, roots, ..
    } = &mut *core;

    roots.maybe_resweep(&*ctx.dom, now);
    let generating = detect(site.detection, &*ctx.dom, roots);

    if let Some(reason) = state.on_detection(generating, now, heartbeat_ms) {
        trace!(
            target: "readyai::reporter",
            "Reporting {} generating={} ({:?})",
            site.key,
            generating,
            reason
        );
        let delivered = ctx.link.send(FrameMessage::ReportStatus {
            is_generating: generating,
            site_key: site.key.clone(),
            site_name: site.name.clone(),
        });
        if !delivered {
            debug!(target: "readyai::reporter", "Status report for {} not delivered", site.key);
        }
    }

    if ctx.config.is_top_frame {
        apply_glyph(&*ctx.dom, state.glyph());
    }
}

fn schedule(scheduled: &mut Option<Instant>, last_check: Option<Instant>, gap: Duration) {
    if scheduled.is_some() {
        return;
    }
    let now = Instant::now();
    let wait = last_check.map_or(Duration::ZERO, |last| {
        gap.saturating_sub(now.saturating_duration_since(last))
    });
    *scheduled = Some(now + wait);
}

async fn check_loop<D: Dom>(ctx: CheckContext<D>, mut signals: mpsc::UnboundedReceiver<Signal>) {
    let mut ticker = tokio::time::interval(ctx.config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_check: Option<Instant> = None;
    let mut scheduled: Option<Instant> = None;

    loop {
        let deadline = scheduled.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = ticker.tick() => {
                schedule(&mut scheduled, last_check, ctx.config.min_check_gap);
            }
            signal = signals.recv() => match signal {
                Some(Signal::Schedule) => {
                    schedule(&mut scheduled, last_check, ctx.config.min_check_gap);
                }
                Some(Signal::Force) => {
                    // A pending check already covers a forced one.
                    if scheduled.is_none() {
                        last_check = Some(Instant::now());
                        run_check(&ctx);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline), if scheduled.is_some() => {
                scheduled = None;
                last_check = Some(Instant::now());
                run_check(&ctx);
            }
        }
    }
}

/// Owns the monitoring lifecycle of one frame.
pub struct FrameReporter<D: Dom> {
    dom: Arc<D>,
    link: Arc<dyn FrameLink>,
    config: ReporterConfig,
    origin: Instant,
    resolver: SiteResolver,
    frame_url: String,
    active: Option<ActiveMonitor<D::Node>>,
}

impl<D: Dom> FrameReporter<D> {
    pub fn is_monitoring(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_site(&self) -> Option<&SiteIdentity> {
        self.active.as_ref().map(|m| &m.site)
    }

    /// Copy of the current reporting state.
    pub fn state(&self) -> Option<FrameMonitorState> {
        self.active.as_ref().map(|m| lock(&m.core).state.clone())
    }

    /// Stop monitoring. Once this returns no further report can be sent.
    pub fn stop(&mut self) {
        let Some(monitor) = self.active.take() else {
            return;
        };
        lock(&monitor.core).open = false;
        monitor.task.abort();
        if self.config.is_top_frame {
            strip_glyph(&*self.dom);
        }
        info!(target: "readyai::reporter", "Stopped monitoring {}", monitor.site.key);
    }

    /// DOM mutation observed; `added` are the roots of inserted subtrees.
    pub fn notify_mutation(&self, added: &[D::Node]) {
        let Some(monitor) = &self.active else {
            return;
        };
        {
            let mut core = lock(&monitor.core);
            if !core.open {
                return;
            }
            core.roots.on_added_nodes(&*self.dom, added);
        }
        let _ = monitor.signals.send(Signal::Schedule);
    }

    pub fn notify_visibility_change(&self) {
        if let Some(monitor) = &self.active {
            let _ = monitor.signals.send(Signal::Schedule);
        }
    }

    /// User interaction. Returns true if it acknowledged an unread completion.
    pub fn notify_interaction(&self, interaction: UserInteraction) -> bool {
        if !interaction.acknowledges() {
            return false;
        }
        let Some(monitor) = &self.active else {
            return false;
        };

        let mut core = lock(&monitor.core);
        if !core.open || !core.state.acknowledge() {
            return false;
        }
        if self.config.is_top_frame {
            apply_glyph(&*self.dom, core.state.glyph());
        }
        debug!(target: "readyai::reporter", "Completion acknowledged on {}", core.site.key);
        let delivered = self.link.send(FrameMessage::Acknowledge {
            site_key: core.site.key.clone(),
            site_name: core.site.name.clone(),
        });
        if !delivered {
            debug!(target: "readyai::reporter", "Acknowledgment for {} not delivered", core.site.key);
        }
        true
    }

    /// Run detection now unless a check is already pending.
    pub fn force_check(&self, reason: &str) -> bool {
        let Some(monitor) = &self.active else {
            return false;
        };
        trace!(target: "readyai::reporter", "Forced check ({})", reason);
        monitor.signals.send(Signal::Force).is_ok()
    }
}

impl<D: Dom + 'static> FrameReporter<D> {
    pub fn new(dom: Arc<D>, link: Arc<dyn FrameLink>, config: ReporterConfig) -> Self {
        Self {
            dom,
            link,
            config,
            origin: Instant::now(),
            resolver: SiteResolver::default(),
            frame_url: String::new(),
            active: None,
        }
    }

    /// Start monitoring `site`. A no-op when already monitoring the same key.
    pub fn start(&mut self, site: SiteIdentity) {
        if self.active.as_ref().is_some_and(|m| m.site.key == site.key) {
            return;
        }
        self.stop();

        let mut roots = SearchRoots::new();
        roots.init(
            &*self.dom,
            site.detection.uses_deep_search(),
            elapsed_ms(self.origin),
        );
        let core = Arc::new(Mutex::new(MonitorCore {
            open: true,
            site: site.clone(),
            state: FrameMonitorState::new(),
            roots,
        }));

        let (signals, rx) = mpsc::unbounded_channel();
        let ctx = CheckContext {
            dom: self.dom.clone(),
            link: self.link.clone(),
            config: self.config.clone(),
            origin: self.origin,
            core: core.clone(),
        };
        let task = tokio::spawn(check_loop(ctx, rx));

        info!(
            target: "readyai::reporter",
            "Monitoring {} ({})",
            site.key,
            site.detection
        );
        self.active = Some(ActiveMonitor {
            site,
            core,
            signals,
            task,
        });
    }

    pub fn sync_site(&mut self, site: Option<SiteIdentity>) {
        match site {
            Some(site) => self.start(site),
            None => self.stop(),
        }
    }

    /// Re-resolve this frame's site, e.g. after a settings change or navigation.
    ///
    /// A non-top frame whose own URL matches nothing asks for the top
    /// document URL and waits for the answer before changing anything.
    pub fn refresh_site(&mut self, resolver: SiteResolver, frame_url: &str) {
        self.resolver = resolver;
        self.frame_url = frame_url.to_string();

        if let Some(site) = self.resolver.resolve(frame_url) {
            self.start(site);
            return;
        }
        if !self.config.is_top_frame {
            if !self.link.send(FrameMessage::GetActiveTabUrl) {
                debug!(target: "readyai::reporter", "Top URL request not delivered");
            }
            return;
        }
        self.stop();
    }

    /// Handle an instruction from the background. Returns the reply, if any.
    pub fn handle_background_message(&mut self, message: BackgroundMessage) -> Option<FrameMessage> {
        match message {
            BackgroundMessage::Ping => Some(FrameMessage::Pong),
            BackgroundMessage::ForceCheck { reason } => {
                self.force_check(&reason);
                Some(FrameMessage::CheckReceived { reason })
            }
            BackgroundMessage::ActiveTabUrl { url } => {
                let site = self.resolver.resolve_for_frame(&self.frame_url, Some(&url));
                self.sync_site(site);
                None
            }
            BackgroundMessage::SitesChanged {
                enabled_sites,
                custom_sites,
            } => {
                let settings = Settings {
                    enabled_sites,
                    custom_sites,
                    ..Settings::default()
                };
                let frame_url = self.frame_url.clone();
                self.refresh_site(SiteResolver::new(&settings), &frame_url);
                None
            }
        }
    }
}

impl<D: Dom> Drop for FrameReporter<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
