//! Navigation trace replay
//!
//! Feeds a JSONL trace through the browser-level engine on a simulated
//! clock. One record per line:
//!
//! ```text
//! {"at": 0,    "type": "navigation", "tab": 1, "url": "https://a.example/", "serverRedirect": true}
//! {"at": 120,  "type": "gesture",    "tab": 1}
//! {"at": 900,  "type": "closed",     "tab": 1}
//! {"at": 1000, "type": "toggle",     "enabled": false}
//! ```
//!
//! `at` is milliseconds from the start of the trace; `frame` defaults to 0.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use bk_core::types::TransitionQualifiers;
use bk_core::{
    Action, ContextId, EngineConfig, EngineError, Enforcement, EnforcementPort, ManualClock,
    NavigationEngine, NavigationEvent, SharedToggle, Verdict,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceRecord {
    #[serde(rename_all = "camelCase")]
    Navigation {
        #[serde(default)]
        at: u64,
        tab: i32,
        url: String,
        #[serde(default)]
        frame: i32,
        #[serde(default)]
        server_redirect: bool,
    },
    Gesture {
        #[serde(default)]
        at: u64,
        tab: i32,
    },
    Closed {
        #[serde(default)]
        at: u64,
        tab: i32,
    },
    Toggle {
        #[serde(default)]
        at: u64,
        enabled: bool,
    },
}

impl TraceRecord {
    pub fn at(&self) -> u64 {
        match self {
            Self::Navigation { at, .. }
            | Self::Gesture { at, .. }
            | Self::Closed { at, .. }
            | Self::Toggle { at, .. } => *at,
        }
    }
}

/// Parse a JSONL trace. Blank lines and `#` comments are skipped.
pub fn parse_trace(text: &str) -> Result<Vec<TraceRecord>, String> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .map_err(|e| format!("Invalid trace record on line {}: {}", idx + 1, e))?;
        out.push(record);
    }
    Ok(out)
}

/// Enforcement stand-in that only counts what would have happened.
#[derive(Debug, Default)]
pub struct RecordingEnforcer {
    pub blocked: Vec<(ContextId, Enforcement)>,
    pub allowed: usize,
}

impl EnforcementPort for RecordingEnforcer {
    fn block(&mut self, context: ContextId, enforcement: Enforcement) -> Result<(), EngineError> {
        self.blocked.push((context, enforcement));
        Ok(())
    }

    fn allow(&mut self, _context: ContextId) {
        self.allowed += 1;
    }
}

/// One navigation decision in the replay output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub at: u64,
    pub tab: i32,
    pub url: String,
    pub verdict: Verdict,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub navigations: usize,
    pub by_action: BTreeMap<&'static str, usize>,
    pub by_reason: BTreeMap<&'static str, usize>,
    pub swept: usize,
    pub steps: Vec<ReplayStep>,
}

/// Run `records` through a fresh engine. Records must be ordered by `at`.
pub fn replay(config: EngineConfig, records: &[TraceRecord]) -> Result<ReplaySummary, String> {
    let clock = ManualClock::new(0);
    let toggle = SharedToggle::default();
    let mut engine = NavigationEngine::new(config, toggle.clone(), RecordingEnforcer::default(), clock.clone());
    let mut summary = ReplaySummary::default();

    let mut last_at = 0;
    for record in records {
        let at = record.at();
        if at < last_at {
            return Err(format!("Trace goes back in time at {}ms (previous {}ms)", at, last_at));
        }
        last_at = at;
        clock.set(at);

        if let Some(removed) = engine.sweep_if_due() {
            summary.swept += removed;
        }

        match record {
            TraceRecord::Navigation {
                tab,
                url,
                frame,
                server_redirect,
                ..
            } => {
                let mut event = NavigationEvent::from_committed(*tab, *frame, url, []);
                if *server_redirect {
                    event = event.with_qualifiers(TransitionQualifiers::SERVER_REDIRECT);
                }
                let verdict = engine.on_navigation(&event);
                if verdict.action == Action::Ignored {
                    continue;
                }
                summary.navigations += 1;
                *summary.by_action.entry(verdict.action.as_str()).or_default() += 1;
                *summary.by_reason.entry(verdict.reason.as_str()).or_default() += 1;
                summary.steps.push(ReplayStep {
                    at,
                    tab: *tab,
                    url: url.clone(),
                    verdict,
                });
            }
            TraceRecord::Gesture { tab, .. } => engine.on_gesture(ContextId(*tab)),
            TraceRecord::Closed { tab, .. } => engine.on_context_closed(ContextId(*tab)),
            TraceRecord::Toggle { enabled, .. } => {
                info!("protection enabled={} at={}ms", enabled, at);
                toggle.set(*enabled);
            }
        }
    }

    let enforcer = engine.enforcer();
    if enforcer.blocked.len() != summary.by_action.get("block").copied().unwrap_or(0) {
        warn!("block count mismatch: enforcer saw {}", enforcer.blocked.len());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"
# three unexplained server redirects, then a clicked one
{"at": 0,    "type": "navigation", "tab": 1, "url": "https://start.example/"}
{"at": 100,  "type": "navigation", "tab": 1, "url": "https://a.example/", "serverRedirect": true}
{"at": 200,  "type": "navigation", "tab": 1, "url": "https://b.example/", "serverRedirect": true}
{"at": 300,  "type": "navigation", "tab": 1, "url": "https://c.example/", "serverRedirect": true}
{"at": 400,  "type": "gesture",    "tab": 1}
{"at": 500,  "type": "navigation", "tab": 1, "url": "https://d.example/", "serverRedirect": true}
{"at": 600,  "type": "navigation", "tab": 1, "url": "https://e.example/frame", "frame": 3}
"#;

    #[test]
    fn test_parse_trace() {
        let records = parse_trace(TRACE).unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(
            records[4],
            TraceRecord::Gesture { at: 400, tab: 1 }
        );
    }

    #[test]
    fn test_parse_trace_reports_line() {
        let err = parse_trace("{\"type\": \"gesture\", \"tab\": 1}\n{oops}").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn test_replay_counts() {
        let records = parse_trace(TRACE).unwrap();
        let summary = replay(EngineConfig::default(), &records).unwrap();

        assert_eq!(summary.navigations, 5);
        assert_eq!(summary.by_action.get("block"), Some(&1));
        assert_eq!(summary.by_reason.get("redirect-chain"), Some(&1));
        assert_eq!(summary.by_reason.get("recent-gesture"), Some(&1));
        assert_eq!(summary.steps[1].verdict.action, Action::MonitorOnly);
    }

    #[test]
    fn test_replay_rejects_unordered_trace() {
        let records = vec![
            TraceRecord::Gesture { at: 10, tab: 1 },
            TraceRecord::Gesture { at: 5, tab: 1 },
        ];
        assert!(replay(EngineConfig::default(), &records).is_err());
    }

    #[test]
    fn test_replay_toggle_off() {
        let records = vec![
            TraceRecord::Toggle { at: 0, enabled: false },
            TraceRecord::Navigation {
                at: 1,
                tab: 1,
                url: "https://a.example/".to_string(),
                frame: 0,
                server_redirect: true,
            },
        ];
        let summary = replay(EngineConfig::default(), &records).unwrap();
        assert_eq!(summary.by_reason.get("protection-off"), Some(&1));
    }
}
