//! Blocky Core Library
//!
//! This crate provides the decision engine for the Blocky navigation-abuse
//! detector. It decides, in real time, whether a navigation, redirect, popup
//! or refresh attempt in a browsing session is hostile or legitimate.
//!
//! # Architecture
//!
//! Two instances of the engine run in different privilege contexts:
//!
//! - [`NavigationEngine`] sits at browser-chrome level and sees committed
//!   top-level navigations for every tab, including server-side redirects.
//! - [`PageGuard`] runs inside one page and polls its address, guards
//!   `window.open`, synthetic link clicks and `<meta http-equiv="refresh">`.
//!
//! Both combine per-context state (gesture recency, redirect counters,
//! pre-approved destinations) with pure URL heuristics and emit a [`Verdict`].
//! The host environment is reached only through the traits in [`ports`].
//!
//! # Modules
//!
//! - `url`: Fast URL slicing without allocations
//! - `classify`: Heuristic URL classifier
//! - `gesture`: User-gesture recency tracking
//! - `session`: Per-context redirect session state
//! - `engine`: Browser-level decision engine
//! - `page`: Page-level guard
//! - `ports`: Collaborator traits (toggle, enforcement, clock, relay)
//! - `config`: Tunables
//! - `types`: Shared type definitions

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod page;
pub mod ports;
pub mod session;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use classify::{Classification, Classifier};
pub use config::{ClassifierConfig, EngineConfig};
pub use engine::NavigationEngine;
pub use error::{ConfigError, EngineError};
pub use page::PageGuard;
pub use ports::{Clock, EnforcementPort, GestureRelay, ManualClock, SharedToggle, SystemClock, ToggleSource};
pub use types::{Action, ContextId, Enforcement, NavigationEvent, Reason, Verdict};
