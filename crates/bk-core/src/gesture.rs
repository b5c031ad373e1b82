//! User-gesture recency tracking.
//!
//! A gesture (pointer, key, touch, form submit) is the engine's proof of
//! intent. Navigations shortly after one are trusted.

use std::collections::HashMap;
use std::hash::Hash;

use crate::types::ContextId;

/// Gesture timestamps of one browsing context or frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureState {
    /// Never decreases while the context is alive
    pub last_gesture_at: Option<u64>,
    /// End of the post-submission grace window
    pub grace_until: Option<u64>,
    /// When the context or frame was first seen without a gesture
    pub registered_at: Option<u64>,
}

impl GestureState {
    #[inline]
    pub fn record(&mut self, now: u64) {
        self.last_gesture_at = Some(self.last_gesture_at.map_or(now, |last| last.max(now)));
    }

    /// `now - last_gesture_at < timeout`; false if no gesture was ever seen.
    #[inline]
    pub fn is_recent(&self, now: u64, timeout_ms: u64) -> bool {
        self.last_gesture_at
            .is_some_and(|last| now.saturating_sub(last) < timeout_ms)
    }

    pub fn open_grace(&mut self, now: u64, grace_ms: u64) {
        let until = now.saturating_add(grace_ms);
        self.grace_until = Some(self.grace_until.map_or(until, |u| u.max(until)));
    }

    #[inline]
    pub fn in_grace(&self, now: u64) -> bool {
        self.grace_until.is_some_and(|until| now < until)
    }

    /// Milliseconds since the last gesture, if any.
    #[inline]
    pub fn age(&self, now: u64) -> Option<u64> {
        self.last_gesture_at.map(|last| now.saturating_sub(last))
    }

    /// Milliseconds since the last gesture or the registration, whichever
    /// is more recent.
    pub fn idle_for(&self, now: u64) -> Option<u64> {
        let last_seen = match (self.last_gesture_at, self.registered_at) {
            (Some(g), Some(r)) => Some(g.max(r)),
            (g, r) => g.or(r),
        };
        last_seen.map(|at| now.saturating_sub(at))
    }
}

/// Gesture state keyed by context (tabs) or frame.
#[derive(Debug, Clone)]
pub struct GestureTracker<K = ContextId> {
    states: HashMap<K, GestureState>,
}

impl<K> Default for GestureTracker<K> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> GestureTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a gesture, creating the state on first use.
    pub fn record_gesture(&mut self, key: K, now: u64) {
        self.states.entry(key).or_default().record(now);
    }

    /// Record a form submission: a gesture plus a grace window during which
    /// forced-navigation checks are bypassed.
    pub fn record_submission(&mut self, key: K, now: u64, grace_ms: u64) {
        let state = self.states.entry(key).or_default();
        state.record(now);
        state.open_grace(now, grace_ms);
    }

    pub fn has_recent_gesture(&self, key: K, now: u64, timeout_ms: u64) -> bool {
        self.states
            .get(&key)
            .is_some_and(|s| s.is_recent(now, timeout_ms))
    }

    pub fn in_submission_grace(&self, key: K, now: u64) -> bool {
        self.states.get(&key).is_some_and(|s| s.in_grace(now))
    }

    /// Track `key` without recording a gesture. The registration counts as
    /// activity for the idle sweep.
    pub fn register(&mut self, key: K, now: u64) {
        let state = self.states.entry(key).or_default();
        state.registered_at = Some(state.registered_at.map_or(now, |r| r.max(now)));
    }

    pub fn contains(&self, key: K) -> bool {
        self.states.contains_key(&key)
    }

    pub fn get(&self, key: K) -> Option<&GestureState> {
        self.states.get(&key)
    }

    pub fn remove(&mut self, key: K) -> Option<GestureState> {
        self.states.remove(&key)
    }

    /// Drop states with no gesture or registration within `max_idle_ms`.
    pub fn sweep(&mut self, now: u64, max_idle_ms: u64) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, s| s.idle_for(now).map_or(true, |idle| idle <= max_idle_ms));
        before - self.states.len()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
