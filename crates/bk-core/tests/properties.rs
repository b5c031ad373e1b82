//! End-to-end behavior of both engines through the public API.

use bk_core::classify::{is_legitimate_redirect, looks_like_redirect_hub};
use bk_core::types::{FrameId, GestureKind, NodeId, StructuralChange};
use bk_core::{
    Action, ContextId, EngineConfig, EngineError, Enforcement, EnforcementPort, ManualClock,
    NavigationEngine, NavigationEvent, PageGuard, Reason, SharedToggle, Verdict,
};

const TAB: ContextId = ContextId(42);

#[derive(Default)]
struct Log {
    blocked: Vec<(ContextId, Enforcement)>,
}

impl EnforcementPort for Log {
    fn block(&mut self, context: ContextId, enforcement: Enforcement) -> Result<(), EngineError> {
        self.blocked.push((context, enforcement));
        Ok(())
    }
}

fn engine() -> (NavigationEngine<SharedToggle, Log, ManualClock>, ManualClock) {
    let clock = ManualClock::new(1_000_000);
    let engine = NavigationEngine::new(
        EngineConfig::default(),
        SharedToggle::default(),
        Log::default(),
        clock.clone(),
    );
    (engine, clock)
}

fn page(start: &str) -> (PageGuard<Log, ManualClock>, ManualClock) {
    let clock = ManualClock::new(1_000_000);
    let guard = PageGuard::new(
        ContextId(7),
        start,
        EngineConfig::default(),
        Log::default(),
        clock.clone(),
        (),
    );
    (guard, clock)
}

/// Query of exactly 320 characters carrying fingerprint tokens.
fn fingerprint_hub() -> String {
    let head = "https://x.example/go";
    let mut url = format!("{head}?screen=1&browser=2&timezone=3&canvas=");
    let pad = 320 - (url.len() - head.len());
    url.push_str(&"z".repeat(pad));
    url
}

#[test]
fn test_short_queries_are_never_hubs() {
    for host in ["redirect.example", "track.example", "x.example"] {
        for len in [0usize, 50, 99] {
            let url = format!("https://{host}/p?{}", "s".repeat(len.saturating_sub(1)));
            assert!(!looks_like_redirect_hub(&url), "{url}");
        }
    }
}

#[test]
fn test_same_origin_is_always_legitimate() {
    for path in ["/", "/ads/popunder", "/track?utm_source=x"] {
        let url = format!("https://shop.example{path}");
        assert!(is_legitimate_redirect(&url, Some("https://shop.example/cart")));
    }
}

#[test]
fn test_redirect_chain_monitor_allow_block() {
    let (mut engine, clock) = engine();
    let hops = [
        "https://a.example/1",
        "https://b.example/2",
        "https://c.example/3",
    ];

    let actions: Vec<Action> = hops
        .iter()
        .map(|url| {
            clock.advance(300);
            engine.on_navigation(&NavigationEvent::server_redirect(TAB, *url)).action
        })
        .collect();

    assert_eq!(actions, vec![Action::MonitorOnly, Action::Allow, Action::Block]);
    assert_eq!(engine.session(TAB).map(|s| s.count()), Some(0));
    assert_eq!(engine.enforcer().blocked, vec![(TAB, Enforcement::NavigateBack)]);
}

#[test]
fn test_gesture_allows_whole_chain() {
    let (mut engine, clock) = engine();
    for i in 0..5 {
        engine.on_gesture(TAB);
        clock.advance(500);
        let url = format!("https://hop{i}.example/");
        let verdict = engine.on_navigation(&NavigationEvent::server_redirect(TAB, url));
        assert_eq!(verdict, Verdict::allow(Reason::RecentGesture));
    }
    assert!(engine.enforcer().blocked.is_empty());
}

#[test]
fn test_hub_blocks_whatever_the_gesture_state() {
    let hub = fingerprint_hub();

    let (mut engine, _) = engine();
    let verdict = engine.on_navigation(&NavigationEvent::top_level(TAB, hub.clone()));
    assert_eq!(verdict, Verdict::block(Reason::RedirectHub, Enforcement::NavigateBack));

    let (mut engine, _) = self::engine();
    engine.on_gesture(TAB);
    let verdict = engine.on_navigation(&NavigationEvent::server_redirect(TAB, hub));
    assert_eq!(verdict.reason, Reason::RedirectHub);
    assert!(verdict.is_block());
}

#[test]
fn test_reset_is_idempotent() {
    let (mut engine, clock) = engine();
    engine.on_navigation(&NavigationEvent::server_redirect(TAB, "https://a.example/"));
    clock.advance(6_000);
    engine.on_gesture(TAB);
    let once = engine.session(TAB).cloned();
    engine.on_gesture(TAB);
    assert_eq!(engine.session(TAB).cloned(), once);
    assert_eq!(engine.session(TAB).map(|s| s.count()), Some(0));
}

#[test]
fn test_protection_off_changes_nothing() {
    let (mut engine, _) = engine();
    engine.toggle().set(false);
    let verdict = engine.on_navigation(&NavigationEvent::top_level(TAB, fingerprint_hub()));
    assert_eq!(verdict, Verdict::allow(Reason::ProtectionOff));
    assert!(engine.session(TAB).is_none());
    assert!(engine.enforcer().blocked.is_empty());
}

#[test]
fn test_idle_state_is_swept() {
    let (mut engine, clock) = engine();
    engine.on_gesture(TAB);
    engine.on_navigation(&NavigationEvent::server_redirect(TAB, "https://a.example/"));
    clock.advance(60_001);
    assert_eq!(engine.sweep(), 2);
    assert!(engine.gestures().is_empty());
    assert!(engine.sessions().is_empty());
}

#[test]
fn test_popup_needs_a_gesture() {
    let (mut guard, clock) = page("https://site.example/");
    assert_eq!(
        guard.request_open(Some("https://ads.example/"), None),
        Verdict::block(Reason::PopupNoGesture, Enforcement::DenyOpen)
    );

    guard.on_gesture(GestureKind::PointerDown);
    clock.advance(1_000);
    assert_eq!(
        guard.request_open(Some("https://partner.example/"), None),
        Verdict::allow(Reason::RecentGesture)
    );
}

#[test]
fn test_popup_from_registered_frame() {
    let (mut guard, _) = page("https://site.example/");
    let frame = FrameId(1);
    guard.on_structural_change(&StructuralChange::FrameAdded(frame));
    guard.on_frame_gesture(frame);
    assert_eq!(guard.request_open(None, Some(frame)).action, Action::Allow);
}

#[test]
fn test_meta_refresh_delays() {
    let (mut guard, _) = page("https://site.example/");
    let short = guard.on_structural_change(&StructuralChange::MetaRefreshAdded {
        node: NodeId(1),
        content: "1;url=https://evil.example".to_string(),
    });
    assert_eq!(short, Verdict::block(Reason::MetaRefresh, Enforcement::RemoveElement(NodeId(1))));

    let long = guard.on_structural_change(&StructuralChange::MetaRefreshAdded {
        node: NodeId(2),
        content: "5;url=https://partner.example".to_string(),
    });
    assert_eq!(long.action, Action::Allow);
    assert_eq!(guard.enforcer().blocked.len(), 1);
}

#[test]
fn test_forced_navigation_is_rolled_back() {
    let (mut guard, clock) = page("https://site.example/read");
    let forced = "https://affiliate.example/offer";

    assert!(guard.poll(forced).is_block());
    clock.advance(200);
    let fired = guard.poll(forced);
    assert_eq!(fired, Verdict::block(Reason::SuspiciousRedirect, Enforcement::HistoryBack));
    assert_eq!(guard.enforcer().blocked, vec![(ContextId(7), Enforcement::HistoryBack)]);

    // The browser went back
    guard.on_history_navigation("https://site.example/read");
    assert_eq!(guard.poll("https://site.example/read"), Verdict::ignored(Reason::Unchanged));
}

#[test]
fn test_interactive_navigation_is_not_rolled_back() {
    let (mut guard, clock) = page("https://site.example/read");
    guard.on_gesture(GestureKind::Click);
    clock.advance(200);
    let verdict = guard.poll("https://affiliate.example/offer");
    assert_eq!(verdict, Verdict::allow(Reason::RecentGesture));
    clock.advance(1_000);
    assert_eq!(guard.tick(), None);
    assert!(guard.enforcer().blocked.is_empty());
}
