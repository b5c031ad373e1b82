//! Page-level Guard
//!
//! Runs inside one page. Not every navigation fires an event page content
//! can observe, so the host polls the page address and feeds it to
//! [`PageGuard::check_address`]; the poll interval is a tunable trading
//! detection latency against overhead.
//!
//! Suspicious address changes are not rolled back at once. A rollback is
//! scheduled `rollback_delay_ms` ahead and fired by [`PageGuard::tick`],
//! so redirects that resolve legitimately within the polling granularity
//! are left alone. At most one rollback is pending; a gesture, a same-origin
//! transition or a history navigation cancels it.

use log::{debug, info, warn};

use crate::classify::{parse_refresh_delay, Classifier};
use crate::config::EngineConfig;
use crate::engine::dispatch;
use crate::gesture::{GestureState, GestureTracker};
use crate::ports::{Clock, EnforcementPort, GestureRelay};
use crate::session::RedirectSession;
use crate::types::{
    ContextId, Enforcement, FrameId, GestureKind, LinkClick, NodeId, Reason, StructuralChange,
    Verdict,
};
use crate::url::{host_matches_domain, same_origin, ParsedUrl};

const LOG_TARGET: &str = "blocky::page";

/// A scheduled history rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRollback {
    pub from: String,
    pub to: String,
    pub due_at: u64,
}

/// Guard for a single page context.
pub struct PageGuard<E, C, R = ()> {
    config: EngineConfig,
    classifier: Classifier,
    context: ContextId,
    enabled: bool,
    enforcer: E,
    clock: C,
    relay: R,
    gesture: GestureState,
    frames: GestureTracker<FrameId>,
    session: RedirectSession,
    pending: Option<PendingRollback>,
    last_sweep_at: u64,
}

impl<E: EnforcementPort, C: Clock, R: GestureRelay> PageGuard<E, C, R> {
    pub fn new(
        context: ContextId,
        initial_url: &str,
        config: EngineConfig,
        enforcer: E,
        clock: C,
        relay: R,
    ) -> Self {
        let now = clock.now_ms();
        let mut session = RedirectSession::new(now);
        session.replace_last_url(initial_url);
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            config,
            context,
            enabled: true,
            enforcer,
            clock,
            relay,
            gesture: GestureState::default(),
            frames: GestureTracker::new(),
            session,
            pending: None,
            last_sweep_at: now,
        }
    }

    /// Toggle change notification from the storage collaborator.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.pending = None;
        }
        info!(target: LOG_TARGET, "protection enabled={} context={}", enabled, self.context);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Address the guard currently considers committed.
    pub fn current_url(&self) -> Option<&str> {
        self.session.last_url()
    }

    pub fn pending_rollback(&self) -> Option<&PendingRollback> {
        self.pending.as_ref()
    }

    /// Time left before the pending rollback fires.
    pub fn next_rollback_in_ms(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.pending.as_ref().map(|p| p.due_at.saturating_sub(now))
    }

    #[inline]
    fn has_recent_gesture(&self, now: u64) -> bool {
        self.gesture.is_recent(now, self.config.page_gesture_timeout_ms)
    }

    pub fn is_pre_approved(&self, url: &str) -> bool {
        self.session.is_allowed(url)
    }

    // =========================================================================
    // Gestures
    // =========================================================================

    /// Intentional interaction on the page.
    pub fn on_gesture(&mut self, kind: GestureKind) {
        let now = self.clock.now_ms();
        self.gesture.record(now);
        if kind == GestureKind::FormSubmit {
            self.gesture.open_grace(now, self.config.submission_grace_ms);
        }
        self.cancel_pending("gesture");
        self.relay_gesture();
    }

    /// Interaction inside a nested frame with its own input.
    pub fn on_frame_gesture(&mut self, frame: FrameId) {
        let now = self.clock.now_ms();
        self.frames.record_gesture(frame, now);
        self.relay_gesture();
    }

    fn relay_gesture(&mut self) {
        // Best effort: the browser-level context may not be listening yet
        if let Err(err) = self.relay.send_gesture() {
            debug!(target: LOG_TARGET, "gesture relay failed error={}", err);
        }
    }

    // =========================================================================
    // Forced navigation
    // =========================================================================

    /// Judge the page address observed by the poller.
    ///
    /// A `Block` verdict here describes a scheduled rollback; enforcement
    /// happens in [`tick`](Self::tick) once the delay elapsed.
    pub fn check_address(&mut self, current: &str) -> Verdict {
        let previous = match self.session.last_url() {
            Some(prev) if prev == current => return Verdict::ignored(Reason::Unchanged),
            Some(prev) => prev.to_string(),
            None => String::new(),
        };
        let now = self.clock.now_ms();

        if !self.enabled {
            self.adopt(current);
            return Verdict::allow(Reason::ProtectionOff);
        }

        if self.gesture.in_grace(now) {
            self.adopt(current);
            return Verdict::allow(Reason::SubmissionGrace);
        }

        if self.session.take_allowed(current) {
            self.adopt(current);
            return Verdict::allow(Reason::PreApproved);
        }

        if self.has_recent_gesture(now) {
            self.session.allow_destination(current, now);
            self.adopt(current);
            return Verdict::allow(Reason::RecentGesture);
        }

        if same_origin(&previous, current) {
            self.adopt(current);
            return Verdict::allow(Reason::SameOrigin);
        }

        if self.classifier.is_suspicious_redirect(&previous, current) {
            self.schedule_rollback(previous, current, now);
            return Verdict::block(Reason::SuspiciousRedirect, Enforcement::HistoryBack);
        }

        self.adopt(current);
        Verdict::allow(Reason::Navigation)
    }

    /// Fire the pending rollback if it is due. Also runs the idle sweep
    /// once per sweep interval.
    pub fn tick(&mut self) -> Option<Verdict> {
        self.sweep_if_due();
        let now = self.clock.now_ms();
        if !self.pending.as_ref().is_some_and(|p| now >= p.due_at) {
            return None;
        }
        let pending = self.pending.take()?;

        let verdict = Verdict::block(Reason::SuspiciousRedirect, Enforcement::HistoryBack);
        let enforced = dispatch(&mut self.enforcer, LOG_TARGET, self.context, &pending.to, verdict);
        if !enforced {
            // Nothing to go back to: let the navigation stand
            self.adopt(&pending.to);
        }
        Some(verdict)
    }

    /// One poll cycle: fire a due rollback, then judge the address.
    pub fn poll(&mut self, current: &str) -> Verdict {
        if let Some(verdict) = self.tick() {
            return verdict;
        }
        self.check_address(current)
    }

    /// History traversal (popstate): adopt the address, cancel any rollback.
    pub fn on_history_navigation(&mut self, url: &str) {
        self.adopt(url);
    }

    fn adopt(&mut self, url: &str) {
        self.session.replace_last_url(url);
        self.cancel_pending("address accepted");
    }

    fn schedule_rollback(&mut self, from: String, to: &str, now: u64) {
        if self.pending.as_ref().is_some_and(|p| p.to == to) {
            return;
        }
        warn!(
            target: LOG_TARGET,
            "suspicious redirect context={} from={} to={}",
            self.context,
            from,
            to
        );
        self.pending = Some(PendingRollback {
            from,
            to: to.to_string(),
            due_at: now.saturating_add(self.config.rollback_delay_ms),
        });
    }

    fn cancel_pending(&mut self, why: &str) {
        if let Some(pending) = self.pending.take() {
            debug!(
                target: LOG_TARGET,
                "rollback cancelled context={} cause={} to={}",
                self.context,
                why,
                pending.to
            );
        }
    }

    // =========================================================================
    // Popups, links, frames, refresh
    // =========================================================================

    /// Guard a request to open a new browsing context (`window.open`),
    /// from the page itself or from a registered frame.
    pub fn request_open(&mut self, url: Option<&str>, frame: Option<FrameId>) -> Verdict {
        if !self.enabled {
            return Verdict::allow(Reason::ProtectionOff);
        }
        let now = self.clock.now_ms();
        let timeout = self.config.page_gesture_timeout_ms;
        let recent = self.has_recent_gesture(now)
            || frame.is_some_and(|f| self.frames.has_recent_gesture(f, now, timeout));

        let verdict = if recent {
            Verdict::allow(Reason::RecentGesture)
        } else {
            Verdict::block(Reason::PopupNoGesture, Enforcement::DenyOpen)
        };
        dispatch(&mut self.enforcer, LOG_TARGET, self.context, url.unwrap_or("about:blank"), verdict);
        verdict
    }

    /// Guard a click on an anchor that opens a new context.
    pub fn on_link_click(&mut self, click: &LinkClick) -> Verdict {
        if !self.enabled {
            return Verdict::allow(Reason::ProtectionOff);
        }
        if click.is_trusted {
            // A real click is its own gesture
            self.on_gesture(GestureKind::Click);
        }
        let verdict = self.judge_link(click, self.clock.now_ms());
        dispatch(&mut self.enforcer, LOG_TARGET, self.context, &click.href, verdict);
        verdict
    }

    fn judge_link(&self, click: &LinkClick, now: u64) -> Verdict {
        if !click.opens_new_context {
            return Verdict::allow(Reason::Navigation);
        }
        if self.has_recent_gesture(now) {
            return Verdict::allow(Reason::RecentGesture);
        }
        let Ok(link) = ParsedUrl::parse(&click.href) else {
            return Verdict::allow(Reason::Navigation);
        };

        let page = self.session.last_url().and_then(|u| ParsedUrl::parse(u).ok());
        if let Some(page) = page {
            // Subdomains of the page host count as the page's own links
            if link.same_origin(&page) || host_matches_domain(link.host, page.host) {
                return Verdict::allow(Reason::SameOrigin);
            }
        }
        if self.classifier.is_well_known_link(link.host) {
            return Verdict::allow(Reason::Legitimate);
        }
        Verdict::block(Reason::SuspiciousLink, Enforcement::CancelClick)
    }

    /// Normalized document change from the host's observer.
    pub fn on_structural_change(&mut self, change: &StructuralChange) -> Verdict {
        match change {
            StructuralChange::FrameAdded(frame) => {
                self.frames.register(*frame, self.clock.now_ms());
                debug!(target: LOG_TARGET, "frame registered context={} frame={}", self.context, frame.0);
                Verdict::ignored(Reason::FrameRegistered)
            }
            StructuralChange::MetaRefreshAdded { node, content } => self.check_meta_refresh(*node, content),
        }
    }

    /// Remove short refresh declarations that no gesture explains.
    pub fn check_meta_refresh(&mut self, node: NodeId, content: &str) -> Verdict {
        if !self.enabled {
            return Verdict::allow(Reason::ProtectionOff);
        }
        if content.is_empty() {
            return Verdict::ignored(Reason::MetaRefresh);
        }

        let now = self.clock.now_ms();
        let delay = parse_refresh_delay(content);
        let verdict = if delay >= self.config.meta_refresh_min_delay_secs {
            Verdict::allow(Reason::Legitimate)
        } else if self.has_recent_gesture(now) {
            Verdict::allow(Reason::RecentGesture)
        } else {
            Verdict::block(Reason::MetaRefresh, Enforcement::RemoveElement(node))
        };
        dispatch(&mut self.enforcer, LOG_TARGET, self.context, content, verdict);
        verdict
    }

    /// Window lost focus. Without a gesture this is how popunders behave,
    /// but it is only ever monitored.
    pub fn on_blur(&mut self) -> Verdict {
        if !self.enabled {
            return Verdict::allow(Reason::ProtectionOff);
        }
        let verdict = if self.has_recent_gesture(self.clock.now_ms()) {
            Verdict::allow(Reason::RecentGesture)
        } else {
            Verdict::monitor(Reason::Popunder)
        };
        let url = self.session.last_url().unwrap_or("").to_string();
        dispatch(&mut self.enforcer, LOG_TARGET, self.context, &url, verdict);
        verdict
    }

    /// Drop frames and pre-approvals idle past the expiry threshold.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.last_sweep_at = now;
        let idle = self.config.idle_expiry_ms;
        let removed = self.frames.sweep(now, idle) + self.session.expire_allowed(now, idle);
        if removed > 0 {
            debug!(
                target: LOG_TARGET,
                "swept {} stale entries context={} frames={}",
                removed,
                self.context,
                self.frames.len()
            );
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) if the sweep interval elapsed.
    pub fn sweep_if_due(&mut self) -> Option<usize> {
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_sweep_at) >= self.config.sweep_interval_ms {
            Some(self.sweep())
        } else {
            None
        }
    }

    pub fn tracked_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn pre_approved_count(&self) -> usize {
        self.session.allowed_count()
    }

    /// Page unload.
    pub fn teardown(&mut self) {
        self.cancel_pending("teardown");
        self.frames.clear();
    }

    pub fn enforcer(&self) -> &E {
        &self.enforcer
    }

    pub fn enforcer_mut(&mut self) -> &mut E {
        &mut self.enforcer
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }
}
