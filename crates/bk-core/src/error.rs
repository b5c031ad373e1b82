//! Error types for the engine and its configuration.
//!
//! None of these ever escape an event handler: the engine logs them and
//! lets the navigation through.

/// Faults raised by URL parsing and by the host collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("Toggle storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Enforcement failed: {0}")]
    EnforcementFailure(String),
    #[error("Gesture relay failed: {0}")]
    RelayFailure(String),
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}
