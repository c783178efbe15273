//! URL identity helpers
//!
//! Every function here is total: malformed input never errors, it falls back
//! to the raw string (or an empty domain).

use url::Url;

/// Schemes that can be saved. Browser-internal pages (chrome://, about:,
/// file:, extension pages) are never captured.
const CAPTURABLE_SCHEMES: &[&str] = &["http", "https"];

/// Canonical deduplication key for a URL.
///
/// Lower-cases the host, drops the fragment and userinfo, strips one trailing
/// slash unless the path is the root, and keeps the query verbatim.
pub fn normalize(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return raw.to_string();
    };

    let mut key = format!("{}://{}", parsed.scheme(), host.to_lowercase());
    if let Some(port) = parsed.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = parsed.path().trim_end_matches('/');
    if path.is_empty() {
        key.push('/');
    } else {
        key.push_str(path);
    }

    if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Whether a tab URL can be saved
pub fn is_capturable(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(parsed) => {
            CAPTURABLE_SCHEMES.contains(&parsed.scheme())
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Lower-cased host without a leading `www.`; empty for unparseable input
pub fn display_domain(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .map(|host| match host.strip_prefix("www.") {
            Some(rest) => rest.to_string(),
            None => host,
        })
        .unwrap_or_default()
}

/// Title used when the tab reports none: domain plus non-root path
pub fn title_fallback(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    if parsed.host_str().is_none() {
        return raw.to_string();
    }

    let domain = display_domain(raw);
    match parsed.path() {
        "" | "/" => domain,
        path => format!("{}{}", domain, path),
    }
}
