//! Collaborator traits.
//!
//! The engines never touch the host environment directly. Toggle storage,
//! enforcement, time and the cross-context gesture relay are all reached
//! through these seams so hosts can swap them and tests can observe them.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EngineError;
use crate::types::{ContextId, Enforcement};

// =============================================================================
// Toggle
// =============================================================================

/// Process-wide on/off switch, owned and persisted by the host.
pub trait ToggleSource {
    /// Read the switch. `Err` means the storage could not be read.
    fn is_enabled(&self) -> Result<bool, EngineError>;
}

/// In-memory toggle handle. Clones share the same flag, so the host can keep
/// one clone for change notifications while the engine reads the other.
#[derive(Debug, Clone)]
pub struct SharedToggle {
    enabled: Rc<Cell<bool>>,
}

impl SharedToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Rc::new(Cell::new(enabled)),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

impl Default for SharedToggle {
    /// Protection defaults to on.
    fn default() -> Self {
        Self::new(true)
    }
}

impl ToggleSource for SharedToggle {
    fn is_enabled(&self) -> Result<bool, EngineError> {
        Ok(self.enabled.get())
    }
}

// =============================================================================
// Enforcement
// =============================================================================

/// Carries out verdicts: go back, deny a popup, remove a node.
///
/// Implementations must be idempotent. Failures are reported once and never
/// retried by the engine.
pub trait EnforcementPort {
    /// Apply a blocking verdict in `context`.
    fn block(&mut self, context: ContextId, enforcement: Enforcement) -> Result<(), EngineError>;

    /// Notification that an event in `context` was allowed through.
    fn allow(&mut self, _context: ContextId) {}
}

// =============================================================================
// Gesture Relay
// =============================================================================

/// Forwards page-context gestures to the browser-level engine as an
/// asynchronous `{type: "userGesture"}` message.
pub trait GestureRelay {
    fn send_gesture(&mut self) -> Result<(), EngineError>;
}

/// No relay (single-context hosts and tests).
impl GestureRelay for () {
    fn send_gesture(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Millisecond wall clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Simulated clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.set(self.now.get().saturating_add(delta_ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_toggle_clones_share_state() {
        let toggle = SharedToggle::default();
        let handle = toggle.clone();
        assert_eq!(toggle.is_enabled(), Ok(true));
        handle.set(false);
        assert_eq!(toggle.is_enabled(), Ok(false));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        other.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
        clock.set(10);
        assert_eq!(other.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        assert!(clock.now_ms() > 0);
    }
}
