//! Heuristic URL Classifier
//!
//! Pure judgments over a URL (and optionally the URL it came from). The
//! layers are evaluated in a fixed order by the engines:
//!
//! 1. Redirect-hub detection acts on the destination alone and wins over
//!    everything else.
//! 2. Legitimate-flow matching (OAuth, payment, verification, major services)
//!    is an escape hatch checked before chain-length enforcement. It is
//!    permissive: a false positive only suppresses a block.
//! 3. Suspicious-hop matching is the fallback for page-level rollbacks.
//!
//! Every function here is total. Unparseable input is never hostile.

use std::sync::OnceLock;

use serde::Serialize;

use crate::config::ClassifierConfig;
use crate::url::{
    contains_ignore_ascii_case, host_matches_domain, starts_with_ignore_ascii_case, url_tokens,
    ParsedUrl,
};

/// Diagnostic summary of all classifier layers for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub url: String,
    pub parseable: bool,
    pub redirect_hub: bool,
    pub legitimate: bool,
    pub suspicious: bool,
    pub query_length: usize,
}

/// URL classifier bound to a set of thresholds and keyword tables.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

#[inline]
fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| contains_ignore_ascii_case(haystack, n))
}

#[inline]
fn has_token(haystack: &str, tokens: &[String]) -> bool {
    url_tokens(haystack).any(|t| tokens.iter().any(|k| k.eq_ignore_ascii_case(t)))
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Fingerprinting redirector: a very long query carrying fingerprint
    /// tokens, or a hub-looking hostname with a moderately long query.
    pub fn looks_like_redirect_hub(&self, url: &str) -> bool {
        let Ok(parsed) = ParsedUrl::parse(url) else {
            return false;
        };
        let c = &self.config;
        let query_len = parsed.search.len();

        let fingerprinting =
            query_len > c.hub_query_threshold && contains_any(parsed.search, &c.fingerprint_tokens);
        let hub_host = query_len > c.hub_host_query_threshold
            && contains_any(parsed.host, &c.hub_host_keywords);

        fingerprinting || hub_host
    }

    /// Same-origin with the referrer, or a recognizable auth/payment/
    /// verification flow, or a major-service domain.
    pub fn is_legitimate_redirect(&self, url: &str, referrer: Option<&str>) -> bool {
        let Ok(target) = ParsedUrl::parse(url) else {
            return false;
        };

        if let Some(Ok(referrer)) = referrer.map(ParsedUrl::parse) {
            if target.same_origin(&referrer) {
                return true;
            }
        }

        let c = &self.config;
        contains_any(target.host, &c.legitimate_keywords)
            || contains_any(target.path, &c.legitimate_keywords)
            || c.legitimate_domains.iter().any(|d| host_matches_domain(target.host, d))
    }

    /// Cross-origin hop that looks like tracking, affiliate or popunder
    /// traffic, or carries an excessive query.
    pub fn is_suspicious_redirect(&self, prev_url: &str, current_url: &str) -> bool {
        let (Ok(prev), Ok(current)) = (ParsedUrl::parse(prev_url), ParsedUrl::parse(current_url))
        else {
            return false;
        };
        if current.same_origin(&prev) {
            return false;
        }

        let c = &self.config;
        let keyword_hit = contains_any(current.host, &c.suspicious_keywords)
            || contains_any(current.path, &c.suspicious_keywords)
            || has_token(current.host, &c.suspicious_tokens)
            || has_token(current.path, &c.suspicious_tokens);

        keyword_hit
            || self.has_tracking_params(&current)
            || current.search.len() > c.suspicious_query_threshold
    }

    fn has_tracking_params(&self, url: &ParsedUrl<'_>) -> bool {
        let c = &self.config;
        url.query_keys().any(|key| {
            c.tracking_param_prefixes.iter().any(|p| starts_with_ignore_ascii_case(key, p))
                || c.tracking_params.iter().any(|p| p.eq_ignore_ascii_case(key))
        })
    }

    /// Link destination on the small allow-list of well-known sites.
    pub fn is_well_known_link(&self, host: &str) -> bool {
        self.config.link_allow_domains.iter().any(|d| host_matches_domain(host, d))
    }

    /// Run every layer against `url` for diagnostics.
    pub fn classify(&self, url: &str, referrer: Option<&str>) -> Classification {
        let parsed = ParsedUrl::parse(url).ok();
        Classification {
            url: url.to_string(),
            parseable: parsed.is_some(),
            redirect_hub: self.looks_like_redirect_hub(url),
            legitimate: self.is_legitimate_redirect(url, referrer),
            suspicious: referrer.is_some_and(|r| self.is_suspicious_redirect(r, url)),
            query_length: parsed.map_or(0, |p| p.search.len()),
        }
    }
}

/// Parse the leading delay of a refresh declaration (`"5;url=..."`).
/// Absent or malformed delays read as `0`.
pub fn parse_refresh_delay(content: &str) -> u32 {
    content
        .trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, d| acc.saturating_mul(10).saturating_add(u32::from(d - b'0')))
}

// =============================================================================
// Default-configured helpers
// =============================================================================

fn default_classifier() -> &'static Classifier {
    static DEFAULT: OnceLock<Classifier> = OnceLock::new();
    DEFAULT.get_or_init(Classifier::default)
}

/// [`Classifier::looks_like_redirect_hub`] with default thresholds.
pub fn looks_like_redirect_hub(url: &str) -> bool {
    default_classifier().looks_like_redirect_hub(url)
}

/// [`Classifier::is_legitimate_redirect`] with default thresholds.
pub fn is_legitimate_redirect(url: &str, referrer: Option<&str>) -> bool {
    default_classifier().is_legitimate_redirect(url, referrer)
}

/// [`Classifier::is_suspicious_redirect`] with default thresholds.
pub fn is_suspicious_redirect(prev_url: &str, current_url: &str) -> bool {
    default_classifier().is_suspicious_redirect(prev_url, current_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub_url() -> String {
        let mut url = String::from(
            "https://x.example/go?screen=1920x1080&browser=chrome&timezone=UTC&gpu=",
        );
        let base_len = url.len() - "https://x.example/go".len();
        url.push_str(&"a".repeat(320 - base_len));
        url
    }

    #[test]
    fn test_hub_fingerprint_query() {
        let url = hub_url();
        assert_eq!(ParsedUrl::parse(&url).unwrap().search.len(), 320);
        assert!(looks_like_redirect_hub(&url));
    }

    #[test]
    fn test_hub_long_query_without_tokens() {
        let url = format!("https://x.example/go?q={}", "a".repeat(400));
        assert!(!looks_like_redirect_hub(&url));
    }

    #[test]
    fn test_hub_host_keyword() {
        let url = format!("https://redirect.example/?id={}", "9".repeat(120));
        assert!(looks_like_redirect_hub(&url));

        let short = "https://redirect.example/?id=42";
        assert!(!looks_like_redirect_hub(short));
    }

    #[test]
    fn test_hub_short_query_never_hub() {
        assert!(!looks_like_redirect_hub("https://clicktrack.example/?screen=1&gpu=2"));
        assert!(!looks_like_redirect_hub("https://example.com/"));
    }

    #[test]
    fn test_hub_malformed() {
        assert!(!looks_like_redirect_hub("::::"));
        assert!(!looks_like_redirect_hub(""));
    }

    #[test]
    fn test_legitimate_same_origin() {
        assert!(is_legitimate_redirect(
            "https://shop.example/cart",
            Some("https://shop.example/item/1")
        ));
    }

    #[test]
    fn test_legitimate_patterns() {
        assert!(is_legitimate_redirect("https://idp.example/oauth/authorize", None));
        assert!(is_legitimate_redirect("https://pay.example/checkout", None));
        assert!(is_legitimate_redirect("https://accounts.google.com/o/x", None));
        assert!(is_legitimate_redirect("https://mail.example/verify?t=1", None));
        assert!(!is_legitimate_redirect("https://hop1.example/next", Some("https://a.example/")));
    }

    #[test]
    fn test_legitimate_ignores_query() {
        // Flow markers only count in host or path
        assert!(!is_legitimate_redirect("https://hop.example/x?return=1", None));
    }

    #[test]
    fn test_legitimate_malformed() {
        assert!(!is_legitimate_redirect("nope", Some("nope")));
    }

    #[test]
    fn test_suspicious_keywords() {
        let prev = "https://news.example/article";
        assert!(is_suspicious_redirect(prev, "https://affiliate-net.example/x"));
        assert!(is_suspicious_redirect(prev, "https://cdn.example/popunder.html"));
        assert!(is_suspicious_redirect(prev, "https://ad.example/"));
        assert!(!is_suspicious_redirect(prev, "https://adobe.example/reader"));
        assert!(!is_suspicious_redirect(prev, "https://download.example/file"));
    }

    #[test]
    fn test_suspicious_tracking_params() {
        let prev = "https://news.example/article";
        assert!(is_suspicious_redirect(prev, "https://shop.example/?utm_source=news"));
        assert!(is_suspicious_redirect(prev, "https://shop.example/?a=1&ref=abc"));
        assert!(!is_suspicious_redirect(prev, "https://shop.example/?prefer=1"));
    }

    #[test]
    fn test_suspicious_long_query() {
        let prev = "https://news.example/article";
        let url = format!("https://shop.example/?q={}", "z".repeat(250));
        assert!(is_suspicious_redirect(prev, &url));
    }

    #[test]
    fn test_suspicious_same_origin_never() {
        assert!(!is_suspicious_redirect(
            "https://news.example/a",
            "https://news.example/redirect?utm_source=x"
        ));
    }

    #[test]
    fn test_suspicious_malformed() {
        assert!(!is_suspicious_redirect("garbage", "https://track.example/"));
        assert!(!is_suspicious_redirect("https://a.example/", "garbage"));
    }

    #[test]
    fn test_parse_refresh_delay() {
        assert_eq!(parse_refresh_delay("1;url=https://evil.example"), 1);
        assert_eq!(parse_refresh_delay("  5; url=https://partner.example"), 5);
        assert_eq!(parse_refresh_delay("url=https://x.example"), 0);
        assert_eq!(parse_refresh_delay(""), 0);
        assert_eq!(parse_refresh_delay("99999999999999"), u32::MAX);
    }

    #[test]
    fn test_custom_thresholds() {
        let classifier = Classifier::new(ClassifierConfig {
            hub_host_query_threshold: 5,
            ..ClassifierConfig::default()
        });
        assert!(classifier.looks_like_redirect_hub("https://track.example/?a=123456"));
        assert!(!looks_like_redirect_hub("https://track.example/?a=123456"));
    }

    #[test]
    fn test_classify_summary() {
        let c = Classifier::default();
        let summary = c.classify("https://track.example/?utm_source=x", Some("https://a.example/"));
        assert!(summary.parseable);
        assert!(!summary.redirect_hub);
        assert!(!summary.legitimate);
        assert!(summary.suspicious);
        assert_eq!(summary.query_length, "?utm_source=x".len());
    }
}
