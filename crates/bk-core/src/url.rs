//! Fast URL slicing utilities for the classifier
//!
//! These functions avoid allocations and work directly on string slices.
//! Parsing is deliberately shallow: enough to recover scheme, host, port,
//! path and query the way a browser's `URL` object exposes them.

use crate::error::EngineError;

// =============================================================================
// Scheme Handling
// =============================================================================

/// Prefixes of browser-owned schemes. Navigations to these are never judged.
const INTERNAL_SCHEME_PREFIXES: &[&str] = &[
    "chrome",
    "edge",
    "about:",
    "moz-extension:",
    "view-source:",
    "devtools:",
];

/// Schemes that must carry a host.
const HIERARCHICAL_SCHEMES: &[&str] = &["http", "https", "ws", "wss", "ftp"];

/// Check if a URL points at a browser-internal page.
#[inline]
pub fn is_internal_url(url: &str) -> bool {
    let bytes = url.trim_start().as_bytes();
    INTERNAL_SCHEME_PREFIXES.iter().any(|prefix| {
        bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    })
}

/// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
#[inline]
fn is_valid_scheme(scheme: &str) -> bool {
    let bytes = scheme.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() => bytes[1..]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.'),
        _ => false,
    }
}

#[inline]
fn is_hierarchical(scheme: &str) -> bool {
    HIERARCHICAL_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme))
}

/// Default port for a scheme, used to normalise origins.
#[inline]
pub fn default_port(scheme: &str) -> Option<u16> {
    let s = scheme.as_bytes();
    if s.eq_ignore_ascii_case(b"http") || s.eq_ignore_ascii_case(b"ws") {
        Some(80)
    } else if s.eq_ignore_ascii_case(b"https") || s.eq_ignore_ascii_case(b"wss") {
        Some(443)
    } else if s.eq_ignore_ascii_case(b"ftp") {
        Some(21)
    } else {
        None
    }
}

// =============================================================================
// Parsed URL
// =============================================================================

/// Zero-copy view of the components of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedUrl<'a> {
    pub scheme: &'a str,
    /// Hostname without userinfo or port; empty for opaque URLs
    pub host: &'a str,
    pub port: Option<u16>,
    /// Path, `/` when absent
    pub path: &'a str,
    /// Query including the leading `?`, empty when absent
    pub search: &'a str,
}

impl<'a> ParsedUrl<'a> {
    /// Parse a URL. Fails with [`EngineError::MalformedUrl`] on anything a
    /// browser would refuse to construct a `URL` from.
    pub fn parse(url: &'a str) -> Result<Self, EngineError> {
        let url = url.trim();
        let malformed = || EngineError::MalformedUrl(url.to_string());

        let colon = url.find(':').ok_or_else(malformed)?;
        let scheme = &url[..colon];
        if !is_valid_scheme(scheme) {
            return Err(malformed());
        }

        let rest = &url[colon + 1..];
        let rest = match rest.find('#') {
            Some(pos) => &rest[..pos],
            None => rest,
        };
        let (before_query, search) = match rest.find('?') {
            Some(pos) if pos + 1 < rest.len() => (&rest[..pos], &rest[pos..]),
            Some(pos) => (&rest[..pos], ""),
            None => (rest, ""),
        };

        let Some(authority_and_path) = before_query.strip_prefix("//") else {
            if is_hierarchical(scheme) {
                return Err(malformed());
            }
            // Opaque URL (data:, mailto:, javascript:)
            return Ok(Self {
                scheme,
                host: "",
                port: None,
                path: before_query,
                search,
            });
        };

        let (authority, path) = match authority_and_path.find('/') {
            Some(pos) => (&authority_and_path[..pos], &authority_and_path[pos..]),
            None => (authority_and_path, "/"),
        };

        // Skip userinfo
        let host_port = match authority.rfind('@') {
            Some(pos) => &authority[pos + 1..],
            None => authority,
        };

        let (host, port) = split_port(host_port).ok_or_else(malformed)?;
        if host.is_empty() && is_hierarchical(scheme) {
            return Err(malformed());
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
            search,
        })
    }

    /// Origin triple of this URL.
    #[inline]
    pub fn origin(&self) -> Origin<'a> {
        Origin {
            scheme: self.scheme,
            host: self.host,
            port: self.port.or_else(|| default_port(self.scheme)),
        }
    }

    /// Same-origin check. Opaque URLs have a unique origin and never match.
    #[inline]
    pub fn same_origin(&self, other: &ParsedUrl<'_>) -> bool {
        !self.host.is_empty() && self.origin() == other.origin()
    }

    /// Iterate over `key` parts of the query string.
    pub fn query_keys(&self) -> impl Iterator<Item = &'a str> {
        self.search
            .strip_prefix('?')
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.find('=') {
                Some(eq_pos) => &pair[..eq_pos],
                None => pair,
            })
    }
}

/// Split `host[:port]`, handling bracketed IPv6 literals.
/// Returns `None` when the port is not a valid number.
fn split_port(host_port: &str) -> Option<(&str, Option<u16>)> {
    let port_sep = if host_port.starts_with('[') {
        let close = host_port.find(']')?;
        match host_port[close + 1..].strip_prefix(':') {
            Some(_) => Some(close + 1),
            None if close + 1 == host_port.len() => None,
            None => return None,
        }
    } else {
        host_port.rfind(':')
    };

    match port_sep {
        Some(pos) => {
            let port_str = &host_port[pos + 1..];
            let port = if port_str.is_empty() {
                None
            } else {
                Some(port_str.parse::<u16>().ok()?)
            };
            Some((&host_port[..pos], port))
        }
        None => Some((host_port, None)),
    }
}

// =============================================================================
// Origin
// =============================================================================

/// Scheme, host and effective port.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
    pub port: Option<u16>,
}

impl PartialEq for Origin<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.scheme.eq_ignore_ascii_case(other.scheme)
            && self.host.eq_ignore_ascii_case(other.host)
            && self.port == other.port
    }
}

/// Total same-origin check over raw strings. Unparseable input is never
/// same-origin with anything.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (ParsedUrl::parse(a), ParsedUrl::parse(b)) {
        (Ok(a), Ok(b)) => a.same_origin(&b),
        _ => false,
    }
}

// =============================================================================
// Matching Helpers
// =============================================================================

/// ASCII case-insensitive substring search.
#[inline]
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() {
        return true;
    }
    if n.len() > h.len() {
        return false;
    }
    h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n))
}

/// ASCII case-insensitive prefix check.
#[inline]
pub fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Iterator over alphanumeric runs of a string.
pub struct Tokens<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.s.as_bytes();
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_alphanumeric() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_alphanumeric() {
            self.pos += 1;
        }
        Some(&self.s[start..self.pos])
    }
}

/// Tokenize a URL component on non-alphanumeric boundaries.
#[inline]
pub fn url_tokens(s: &str) -> Tokens<'_> {
    Tokens { s, pos: 0 }
}

/// Host equals `domain` or is one of its subdomains.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let h = host.trim_end_matches('.').as_bytes();
    let d = domain.as_bytes();
    if d.is_empty() || h.len() < d.len() {
        return false;
    }
    if h.len() == d.len() {
        return h.eq_ignore_ascii_case(d);
    }
    let split = h.len() - d.len();
    h[split - 1] == b'.' && h[split..].eq_ignore_ascii_case(d)
}
