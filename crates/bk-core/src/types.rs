//! Core type definitions for Blocky
//!
//! Events flowing into the engine and the verdicts flowing out of it.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Browsing context (tab) identifier, as assigned by the host browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nested frame identifier within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub i32);

/// Host-side handle of a document node (e.g. a `<meta>` element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

// =============================================================================
// Transition Qualifiers
// =============================================================================

bitflags::bitflags! {
    /// Qualifiers attached to a committed navigation by the host browser.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransitionQualifiers: u8 {
        /// Caused by an HTTP 3xx response
        const SERVER_REDIRECT = 1 << 0;
        /// Caused by script or `<meta>` refresh
        const CLIENT_REDIRECT = 1 << 1;
        /// Back/forward history traversal
        const FORWARD_BACK = 1 << 2;
        /// Typed into the address bar
        const FROM_ADDRESS_BAR = 1 << 3;
    }
}

impl TransitionQualifiers {
    /// Parse a single qualifier string as delivered by the browser.
    /// Unknown qualifiers map to the empty set.
    pub fn from_str(s: &str) -> Self {
        match s {
            "server_redirect" => Self::SERVER_REDIRECT,
            "client_redirect" => Self::CLIENT_REDIRECT,
            "forward_back" => Self::FORWARD_BACK,
            "from_address_bar" => Self::FROM_ADDRESS_BAR,
            _ => Self::empty(),
        }
    }

    /// Parse a list of qualifier strings.
    pub fn from_list<'a, I>(qualifiers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        qualifiers
            .into_iter()
            .fold(Self::empty(), |acc, q| acc | Self::from_str(q))
    }
}

// =============================================================================
// Input Events
// =============================================================================

/// A committed navigation as seen from browser-chrome level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    /// Tab the navigation happened in
    pub context: ContextId,
    /// Destination URL
    pub url: String,
    /// Whether the navigation targets the top-level frame
    pub is_top_level: bool,
    /// Browser-supplied transition qualifiers
    pub qualifiers: TransitionQualifiers,
}

impl NavigationEvent {
    /// A plain top-level navigation with no qualifiers.
    pub fn top_level(context: ContextId, url: impl Into<String>) -> Self {
        Self {
            context,
            url: url.into(),
            is_top_level: true,
            qualifiers: TransitionQualifiers::empty(),
        }
    }

    /// A top-level navigation tagged as a server-side redirect.
    pub fn server_redirect(context: ContextId, url: impl Into<String>) -> Self {
        Self::top_level(context, url).with_qualifiers(TransitionQualifiers::SERVER_REDIRECT)
    }

    /// Build from the raw fields of a `webNavigation.onCommitted` event.
    /// Frame id `0` is the top-level frame.
    pub fn from_committed<'a, I>(tab_id: i32, frame_id: i32, url: &str, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            context: ContextId(tab_id),
            url: url.to_string(),
            is_top_level: frame_id == 0,
            qualifiers: TransitionQualifiers::from_list(qualifiers),
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: TransitionQualifiers) -> Self {
        self.qualifiers |= qualifiers;
        self
    }

    #[inline]
    pub fn is_server_redirect(&self) -> bool {
        self.qualifiers.contains(TransitionQualifiers::SERVER_REDIRECT)
    }
}

/// Intentional user interaction types that count as a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GestureKind {
    PointerDown,
    Click,
    KeyDown,
    TouchStart,
    /// Also opens the submission grace window
    FormSubmit,
}

impl GestureKind {
    /// Map a DOM event name to a gesture kind.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "mousedown" | "pointerdown" => Some(Self::PointerDown),
            "click" => Some(Self::Click),
            "keydown" => Some(Self::KeyDown),
            "touchstart" => Some(Self::TouchStart),
            "submit" => Some(Self::FormSubmit),
            _ => None,
        }
    }
}

/// Normalized structural change reported by the host's document observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralChange {
    /// A nested frame was inserted into the page
    FrameAdded(FrameId),
    /// A refresh-type `<meta>` declaration appeared
    MetaRefreshAdded { node: NodeId, content: String },
}

/// Click on an anchor element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClick {
    /// Absolute link destination
    pub href: String,
    /// `target="_blank"` or equivalent
    pub opens_new_context: bool,
    /// `false` for programmatically dispatched clicks
    pub is_trusted: bool,
}

// =============================================================================
// Verdicts
// =============================================================================

/// Decision emitted for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Allow,
    Block,
    /// Logged, no enforcement
    MonitorOnly,
    /// Event outside the engine's remit (sub-frame, internal page, no change)
    Ignored,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::MonitorOnly => "monitor-only",
            Self::Ignored => "ignored",
        }
    }
}

/// Reason code attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    RedirectHub,
    RedirectChain,
    PopupNoGesture,
    SuspiciousRedirect,
    MetaRefresh,
    Legitimate,
    ServerRedirect,
    SuspiciousLink,
    Popunder,
    ProtectionOff,
    StorageUnavailable,
    RecentGesture,
    WithinTolerance,
    Navigation,
    PreApproved,
    SameOrigin,
    SubmissionGrace,
    Unchanged,
    NotTopLevel,
    InternalUrl,
    FrameRegistered,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedirectHub => "redirect-hub",
            Self::RedirectChain => "redirect-chain",
            Self::PopupNoGesture => "popup-no-gesture",
            Self::SuspiciousRedirect => "suspicious-redirect",
            Self::MetaRefresh => "meta-refresh",
            Self::Legitimate => "legitimate",
            Self::ServerRedirect => "server-redirect",
            Self::SuspiciousLink => "suspicious-link",
            Self::Popunder => "popunder",
            Self::ProtectionOff => "protection-off",
            Self::StorageUnavailable => "storage-unavailable",
            Self::RecentGesture => "recent-gesture",
            Self::WithinTolerance => "within-tolerance",
            Self::Navigation => "navigation",
            Self::PreApproved => "pre-approved",
            Self::SameOrigin => "same-origin",
            Self::SubmissionGrace => "submission-grace",
            Self::Unchanged => "unchanged",
            Self::NotTopLevel => "not-top-level",
            Self::InternalUrl => "internal-url",
            Self::FrameRegistered => "frame-registered",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the enforcement collaborator must do for a blocking verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Enforcement {
    None,
    /// Browser-level `tabs.goBack`
    NavigateBack,
    /// Page-level `history.back()`
    HistoryBack,
    /// Return no new browsing context from `open`
    DenyOpen,
    /// Remove a document node
    RemoveElement(NodeId),
    /// Cancel the click's default action and propagation
    CancelClick,
}

impl Enforcement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NavigateBack => "navigate-back",
            Self::HistoryBack => "history-back",
            Self::DenyOpen => "deny-open",
            Self::RemoveElement(_) => "remove-element",
            Self::CancelClick => "cancel-click",
        }
    }
}

/// Result of deciding one event. Transient: dispatched and logged, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: Action,
    pub reason: Reason,
    pub enforcement: Enforcement,
}

impl Verdict {
    pub const fn allow(reason: Reason) -> Self {
        Self { action: Action::Allow, reason, enforcement: Enforcement::None }
    }

    pub const fn block(reason: Reason, enforcement: Enforcement) -> Self {
        Self { action: Action::Block, reason, enforcement }
    }

    pub const fn monitor(reason: Reason) -> Self {
        Self { action: Action::MonitorOnly, reason, enforcement: Enforcement::None }
    }

    pub const fn ignored(reason: Reason) -> Self {
        Self { action: Action::Ignored, reason, enforcement: Enforcement::None }
    }

    #[inline]
    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.action.as_str(), self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifiers_from_list() {
        let q = TransitionQualifiers::from_list(["server_redirect", "from_address_bar", "bogus"]);
        assert!(q.contains(TransitionQualifiers::SERVER_REDIRECT));
        assert!(q.contains(TransitionQualifiers::FROM_ADDRESS_BAR));
        assert!(!q.contains(TransitionQualifiers::CLIENT_REDIRECT));
    }

    #[test]
    fn test_from_committed() {
        let ev = NavigationEvent::from_committed(7, 0, "https://a.example/", ["server_redirect"]);
        assert_eq!(ev.context, ContextId(7));
        assert!(ev.is_top_level);
        assert!(ev.is_server_redirect());

        let sub = NavigationEvent::from_committed(7, 3, "https://a.example/", []);
        assert!(!sub.is_top_level);
        assert!(!sub.is_server_redirect());
    }

    #[test]
    fn test_gesture_kind_from_event_name() {
        assert_eq!(GestureKind::from_event_name("submit"), Some(GestureKind::FormSubmit));
        assert_eq!(GestureKind::from_event_name("keydown"), Some(GestureKind::KeyDown));
        assert_eq!(GestureKind::from_event_name("scroll"), None);
    }

    #[test]
    fn test_verdict_serializes_kebab_case() {
        let v = Verdict::block(Reason::RedirectHub, Enforcement::NavigateBack);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(
            json,
            r#"{"action":"block","reason":"redirect-hub","enforcement":"navigate-back"}"#
        );
    }
}
