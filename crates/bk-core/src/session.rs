//! Per-context redirect session state.

use std::collections::HashMap;

use crate::types::ContextId;

/// Redirect bookkeeping for one browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSession {
    count: u32,
    last_reset_at: u64,
    last_touched_at: u64,
    last_url: Option<String>,
    /// Pre-approved destination -> approval time
    allowed_destinations: HashMap<String, u64>,
}

impl RedirectSession {
    pub fn new(now: u64) -> Self {
        Self {
            count: 0,
            last_reset_at: now,
            last_touched_at: now,
            last_url: None,
            allowed_destinations: HashMap::new(),
        }
    }

    /// Consecutive unexplained redirects.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn last_reset_at(&self) -> u64 {
        self.last_reset_at
    }

    #[inline]
    pub fn last_touched_at(&self) -> u64 {
        self.last_touched_at
    }

    /// Last address committed in this context.
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub fn touch(&mut self, now: u64) {
        self.last_touched_at = self.last_touched_at.max(now);
    }

    /// Reset the counter when the chain window elapsed or a gesture explains
    /// the navigation. Returns whether a reset happened. Idempotent.
    pub fn apply_reset_rule(&mut self, now: u64, recent_gesture: bool, window_ms: u64) -> bool {
        if now.saturating_sub(self.last_reset_at) > window_ms || recent_gesture {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Explicit reset signal.
    pub fn reset(&mut self, now: u64) {
        self.count = 0;
        self.last_reset_at = now;
    }

    /// Clear the counter without restarting the chain window.
    #[inline]
    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    /// Count one more unexplained redirect.
    #[inline]
    pub fn record_redirect(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Set the current address, returning the previous one.
    pub fn replace_last_url(&mut self, url: &str) -> Option<String> {
        self.last_url.replace(url.to_string())
    }

    /// Pre-approve a destination reached under a recent gesture.
    pub fn allow_destination(&mut self, url: &str, now: u64) {
        self.allowed_destinations.insert(url.to_string(), now);
    }

    /// Consume a pre-approval. Each approval is good for one arrival.
    pub fn take_allowed(&mut self, url: &str) -> bool {
        self.allowed_destinations.remove(url).is_some()
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.allowed_destinations.contains_key(url)
    }

    /// Drop approvals older than `max_age_ms`. Returns how many were dropped.
    pub fn expire_allowed(&mut self, now: u64, max_age_ms: u64) -> usize {
        let before = self.allowed_destinations.len();
        self.allowed_destinations
            .retain(|_, approved_at| now.saturating_sub(*approved_at) <= max_age_ms);
        before - self.allowed_destinations.len()
    }

    pub fn allowed_count(&self) -> usize {
        self.allowed_destinations.len()
    }
}

/// Session state for every tracked context, owned by the engine.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: HashMap<ContextId, RedirectSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session of `context`, created on first navigation.
    pub fn get_or_create(&mut self, context: ContextId, now: u64) -> &mut RedirectSession {
        self.sessions
            .entry(context)
            .or_insert_with(|| RedirectSession::new(now))
    }

    pub fn get(&self, context: ContextId) -> Option<&RedirectSession> {
        self.sessions.get(&context)
    }

    pub fn get_mut(&mut self, context: ContextId) -> Option<&mut RedirectSession> {
        self.sessions.get_mut(&context)
    }

    pub fn remove(&mut self, context: ContextId) -> Option<RedirectSession> {
        self.sessions.remove(&context)
    }

    /// Drop sessions untouched for more than `max_idle_ms`.
    pub fn sweep(&mut self, now: u64, max_idle_ms: u64) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now.saturating_sub(s.last_touched_at) <= max_idle_ms);
        before - self.sessions.len()
    }

    pub fn contains(&self, context: ContextId) -> bool {
        self.sessions.contains_key(&context)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_rule_window() {
        let mut s = RedirectSession::new(0);
        s.record_redirect();
        s.record_redirect();
        assert!(!s.apply_reset_rule(5_000, false, 5_000));
        assert_eq!(s.count(), 2);
        assert!(s.apply_reset_rule(5_001, false, 5_000));
        assert_eq!(s.count(), 0);
        assert_eq!(s.last_reset_at(), 5_001);
    }

    #[test]
    fn test_reset_rule_gesture() {
        let mut s = RedirectSession::new(0);
        s.record_redirect();
        assert!(s.apply_reset_rule(10, true, 5_000));
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn test_reset_rule_idempotent() {
        let mut s = RedirectSession::new(0);
        s.record_redirect();
        s.apply_reset_rule(6_000, true, 5_000);
        let once = s.clone();
        s.apply_reset_rule(6_000, true, 5_000);
        assert_eq!(s, once);
    }

    #[test]
    fn test_allowed_destinations_are_consumed() {
        let mut s = RedirectSession::new(0);
        s.allow_destination("https://a.example/next", 0);
        assert!(s.is_allowed("https://a.example/next"));
        assert!(s.take_allowed("https://a.example/next"));
        assert!(!s.take_allowed("https://a.example/next"));
        assert_eq!(s.allowed_count(), 0);
    }

    #[test]
    fn test_allowed_destinations_expire() {
        let mut s = RedirectSession::new(0);
        s.allow_destination("https://a.example/old", 1_000);
        s.allow_destination("https://b.example/new", 50_000);
        assert_eq!(s.allowed_count(), 2);

        assert_eq!(s.expire_allowed(61_001, 60_000), 1);
        assert!(!s.is_allowed("https://a.example/old"));
        assert!(s.is_allowed("https://b.example/new"));
        assert_eq!(s.allowed_count(), 1);
    }

    #[test]
    fn test_replace_last_url() {
        let mut s = RedirectSession::new(0);
        assert_eq!(s.replace_last_url("https://a.example/"), None);
        assert_eq!(
            s.replace_last_url("https://b.example/").as_deref(),
            Some("https://a.example/")
        );
        assert_eq!(s.last_url(), Some("https://b.example/"));
    }

    #[test]
    fn test_store_sweep() {
        let mut store = SessionStore::new();
        store.get_or_create(ContextId(1), 0);
        store.get_or_create(ContextId(2), 0).touch(30_000);

        assert_eq!(store.sweep(60_001, 60_000), 1);
        assert!(!store.contains(ContextId(1)));
        assert!(store.contains(ContextId(2)));
    }
}
