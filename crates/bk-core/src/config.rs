//! Engine tunables.
//!
//! Every threshold the decision rules use lives here so hosts can tune them
//! without a rebuild. All fields have defaults; a config file only needs the
//! keys it changes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Thresholds and keyword tables for the heuristic classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Query length above which fingerprint tokens mark a redirect hub
    pub hub_query_threshold: usize,
    /// Query length above which a hub-looking hostname marks a redirect hub
    pub hub_host_query_threshold: usize,
    /// Query length above which a cross-origin hop is suspicious on its own
    pub suspicious_query_threshold: usize,
    pub fingerprint_tokens: Vec<String>,
    pub hub_host_keywords: Vec<String>,
    /// OAuth, payment and verification flow markers (host or path)
    pub legitimate_keywords: Vec<String>,
    pub legitimate_domains: Vec<String>,
    /// Substring markers of tracking/affiliate/popunder hops (host or path)
    pub suspicious_keywords: Vec<String>,
    /// Short markers only matched as whole host/path tokens
    pub suspicious_tokens: Vec<String>,
    /// Query keys starting with one of these are tracking parameters
    pub tracking_param_prefixes: Vec<String>,
    /// Query keys equal to one of these are tracking parameters
    pub tracking_params: Vec<String>,
    /// Destinations a synthetic new-tab link click may always reach
    pub link_allow_domains: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hub_query_threshold: 300,
            hub_host_query_threshold: 100,
            suspicious_query_threshold: 200,
            fingerprint_tokens: strings(&[
                "screen", "browser", "timezone", "gpu", "canvas", "wasm", "build-id", "js_build",
                "fingerprint",
            ]),
            hub_host_keywords: strings(&["chaipoksore", "redirect", "track", "click"]),
            legitimate_keywords: strings(&[
                "oauth", "auth", "login", "logout", "callback", "return", "checkout", "payment",
                "paypal", "stripe", "verify", "confirm", "validate",
            ]),
            legitimate_domains: strings(&["github.com", "google.com", "microsoft.com", "apple.com"]),
            suspicious_keywords: strings(&[
                "redirect", "track", "affiliate", "click", "popup", "popunder",
            ]),
            suspicious_tokens: strings(&["ad", "ads"]),
            tracking_param_prefixes: strings(&["utm_"]),
            tracking_params: strings(&["ref", "source", "campaign"]),
            link_allow_domains: strings(&[
                "github.com", "stackoverflow.com", "wikipedia.org", "youtube.com", "reddit.com",
                "twitter.com", "x.com",
            ]),
        }
    }
}

/// Timing and threshold configuration shared by both engine instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Gesture recency window for browser-level decisions
    pub gesture_timeout_ms: u64,
    /// Gesture recency window for page-level decisions
    pub page_gesture_timeout_ms: u64,
    /// Redirect counter resets once this much time passed since the last reset
    pub redirect_window_ms: u64,
    /// Redirects tolerated in one chain before blocking
    pub max_allowed_redirects: u32,
    /// Address checks are bypassed for this long after a form submission
    pub submission_grace_ms: u64,
    /// Page address poll interval. Trades detection latency against overhead.
    pub poll_interval_ms: u64,
    /// Delay before a suspicious page-level redirect is rolled back
    pub rollback_delay_ms: u64,
    pub sweep_interval_ms: u64,
    /// Per-context state idle for longer than this is swept
    pub idle_expiry_ms: u64,
    /// Refresh declarations with a shorter delay are removed
    pub meta_refresh_min_delay_secs: u32,
    pub classifier: ClassifierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gesture_timeout_ms: 3_000,
            page_gesture_timeout_ms: 2_000,
            redirect_window_ms: 5_000,
            max_allowed_redirects: 2,
            submission_grace_ms: 3_000,
            poll_interval_ms: 200,
            rollback_delay_ms: 100,
            sweep_interval_ms: 30_000,
            idle_expiry_ms: 60_000,
            meta_refresh_min_delay_secs: 2,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a rule by accident.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("gestureTimeoutMs", self.gesture_timeout_ms),
            ("pageGestureTimeoutMs", self.page_gesture_timeout_ms),
            ("redirectWindowMs", self.redirect_window_ms),
            ("pollIntervalMs", self.poll_interval_ms),
            ("sweepIntervalMs", self.sweep_interval_ms),
            ("idleExpiryMs", self.idle_expiry_ms),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.idle_expiry_ms < self.redirect_window_ms {
            return Err(ConfigError::Invalid(format!(
                "idleExpiryMs ({}) must not be shorter than redirectWindowMs ({})",
                self.idle_expiry_ms, self.redirect_window_ms
            )));
        }

        let c = &self.classifier;
        if c.hub_host_query_threshold > c.hub_query_threshold {
            return Err(ConfigError::Invalid(format!(
                "classifier.hubHostQueryThreshold ({}) must not exceed hubQueryThreshold ({})",
                c.hub_host_query_threshold, c.hub_query_threshold
            )));
        }

        Ok(())
    }
}
