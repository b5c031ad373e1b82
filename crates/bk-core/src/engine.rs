//! Browser-level Decision Engine
//!
//! Sees every committed top-level navigation of every tab, including the
//! server-side redirects page content cannot observe. Owns the gesture and
//! redirect-session state for all tabs.
//!
//! Per navigation:
//!
//! 1. Protection off: allow, no state change.
//! 2. Apply the session reset rule (chain window elapsed, or recent gesture).
//! 3. Redirect hub: block and go back. The chain counter is not touched.
//!    An unparseable destination is allowed and never counted.
//! 4. Server redirect:
//!    - legitimate flow: allow, counter to 0
//!    - otherwise count it; over the tolerance without a gesture blocks,
//!      the first hop without a gesture is only monitored
//! 5. Any other navigation: counter to 0, allow.

use log::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::gesture::GestureTracker;
use crate::ports::{Clock, EnforcementPort, ToggleSource};
use crate::session::{RedirectSession, SessionStore};
use crate::types::{Action, ContextId, Enforcement, NavigationEvent, Reason, Verdict};
use crate::url::{is_internal_url, ParsedUrl};

const LOG_TARGET: &str = "blocky::engine";

/// Log a verdict and hand blocking verdicts to the enforcement port.
/// Returns `false` if enforcement was attempted and failed.
pub(crate) fn dispatch<E: EnforcementPort>(
    enforcer: &mut E,
    target: &'static str,
    context: ContextId,
    url: &str,
    verdict: Verdict,
) -> bool {
    match verdict.action {
        Action::Block => {
            warn!(
                target: target,
                "blocked context={} reason={} enforcement={} url={}",
                context,
                verdict.reason,
                verdict.enforcement.as_str(),
                url
            );
            if let Err(err) = enforcer.block(context, verdict.enforcement) {
                error!(
                    target: target,
                    "enforcement failed context={} enforcement={} error={}",
                    context,
                    verdict.enforcement.as_str(),
                    err
                );
                return false;
            }
        }
        Action::MonitorOnly => {
            info!(
                target: target,
                "monitoring context={} reason={} url={}",
                context,
                verdict.reason,
                url
            );
        }
        Action::Allow => {
            debug!(
                target: target,
                "allowed context={} reason={} url={}",
                context,
                verdict.reason,
                url
            );
            enforcer.allow(context);
        }
        Action::Ignored => {}
    }
    true
}

/// The browser-level engine.
pub struct NavigationEngine<T, E, C> {
    config: EngineConfig,
    classifier: Classifier,
    toggle: T,
    enforcer: E,
    clock: C,
    gestures: GestureTracker<ContextId>,
    sessions: SessionStore,
    last_sweep_at: u64,
}

impl<T: ToggleSource, E: EnforcementPort, C: Clock> NavigationEngine<T, E, C> {
    pub fn new(config: EngineConfig, toggle: T, enforcer: E, clock: C) -> Self {
        let classifier = Classifier::new(config.classifier.clone());
        let last_sweep_at = clock.now_ms();
        Self {
            config,
            classifier,
            toggle,
            enforcer,
            clock,
            gestures: GestureTracker::new(),
            sessions: SessionStore::new(),
            last_sweep_at,
        }
    }

    /// Decide a committed navigation and dispatch the verdict.
    pub fn on_navigation(&mut self, event: &NavigationEvent) -> Verdict {
        if !event.is_top_level {
            return Verdict::ignored(Reason::NotTopLevel);
        }
        if is_internal_url(&event.url) {
            return Verdict::ignored(Reason::InternalUrl);
        }

        match self.toggle.is_enabled() {
            Ok(true) => {}
            Ok(false) => return Verdict::allow(Reason::ProtectionOff),
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    "toggle read failed, skipping decision context={} error={}",
                    event.context,
                    err
                );
                return Verdict::allow(Reason::StorageUnavailable);
            }
        }

        let now = self.clock.now_ms();
        let verdict = self.decide(event, now);
        dispatch(&mut self.enforcer, LOG_TARGET, event.context, &event.url, verdict);
        verdict
    }

    fn decide(&mut self, event: &NavigationEvent, now: u64) -> Verdict {
        let recent = self
            .gestures
            .has_recent_gesture(event.context, now, self.config.gesture_timeout_ms);

        let session = self.sessions.get_or_create(event.context, now);
        session.touch(now);
        session.apply_reset_rule(now, recent, self.config.redirect_window_ms);

        if self.classifier.looks_like_redirect_hub(&event.url) {
            session.replace_last_url(&event.url);
            return Verdict::block(Reason::RedirectHub, Enforcement::NavigateBack);
        }

        // Unparseable targets are never judged and never counted
        if ParsedUrl::parse(&event.url).is_err() {
            return Verdict::allow(Reason::Navigation);
        }
        let referrer = session.replace_last_url(&event.url);

        if !event.is_server_redirect() {
            session.reset_count();
            return Verdict::allow(Reason::Navigation);
        }

        if self.classifier.is_legitimate_redirect(&event.url, referrer.as_deref()) {
            session.reset_count();
            return Verdict::allow(Reason::Legitimate);
        }

        let count = session.record_redirect();
        if recent {
            Verdict::allow(Reason::RecentGesture)
        } else if count > self.config.max_allowed_redirects {
            session.reset_count();
            Verdict::block(Reason::RedirectChain, Enforcement::NavigateBack)
        } else if count == 1 {
            // A single hop is not conclusive
            Verdict::monitor(Reason::ServerRedirect)
        } else {
            Verdict::allow(Reason::WithinTolerance)
        }
    }

    /// Relayed `userGesture` message from page content.
    pub fn on_gesture(&mut self, context: ContextId) {
        let now = self.clock.now_ms();
        self.gestures.record_gesture(context, now);
        if let Some(session) = self.sessions.get_mut(context) {
            session.reset(now);
        }
        debug!(target: LOG_TARGET, "gesture context={}", context);
    }

    /// Tab closed: drop its state immediately.
    pub fn on_context_closed(&mut self, context: ContextId) {
        self.gestures.remove(context);
        self.sessions.remove(context);
        debug!(target: LOG_TARGET, "context closed context={}", context);
    }

    /// Remove state of contexts idle past the expiry threshold.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.last_sweep_at = now;
        let idle = self.config.idle_expiry_ms;
        let removed = self.gestures.sweep(now, idle) + self.sessions.sweep(now, idle);
        if removed > 0 {
            debug!(
                target: LOG_TARGET,
                "swept {} stale entries, {} sessions remain",
                removed,
                self.sessions.len()
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

    pub fn has_recent_gesture(&self, context: ContextId) -> bool {
        self.gestures
            .has_recent_gesture(context, self.clock.now_ms(), self.config.gesture_timeout_ms)
    }

    pub fn session(&self, context: ContextId) -> Option<&RedirectSession> {
        self.sessions.get(context)
    }

    pub fn gestures(&self) -> &GestureTracker<ContextId> {
        &self.gestures
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn toggle(&self) -> &T {
        &self.toggle
    }

    pub fn enforcer(&self) -> &E {
        &self.enforcer
    }

    pub fn enforcer_mut(&mut self) -> &mut E {
        &mut self.enforcer
    }
}
