//! Host-level view of URLs: which pages count toward dwell time, and which
//! domains a block-list entry covers.

use url::Url;

const INTERNAL_SCHEMES: &[&str] = &[
    "about",
    "blob",
    "brave",
    "chrome",
    "chrome-extension",
    "chrome-search",
    "chrome-untrusted",
    "data",
    "devtools",
    "edge",
    "file",
    "javascript",
    "moz-extension",
    "opera",
    "resource",
    "view-source",
    "vivaldi",
];

/// Returns the host of `url` when the page should accrue dwell time.
///
/// Unparseable URLs, internal browser schemes and host-less URLs are all
/// untrackable and yield `None`.
pub fn trackable_domain(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed).ok()?;
    if INTERNAL_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }
    parsed
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty())
}

/// Host of any parseable URL regardless of scheme; used when scanning open pages.
pub fn page_domain(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()?
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty())
}

/// `domain` is covered by `site` when equal or a subdomain of it.
pub fn is_blocked_by(domain: &str, site: &str) -> bool {
    let site = site.trim();
    if site.is_empty() {
        return false;
    }
    domain == site
        || domain
            .strip_suffix(site)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub fn is_blocked_by_any<S: AsRef<str>>(domain: &str, sites: &[S]) -> bool {
    sites.iter().any(|site| is_blocked_by(domain, site.as_ref()))
}

/// Normalizes user input such as `https://www.Example.com/path` to `example.com`.
pub fn normalize_site_input(input: &str) -> Option<String> {
    let lowered = input.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let host = without_www.split('/').next().unwrap_or_default().trim();
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}
