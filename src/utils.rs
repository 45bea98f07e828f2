//! Utility functions for the proxy pool.

use std::collections::HashSet;
use url::Url;

/// Parse the text content of a proxy list into `host:port` addresses.
///
/// Blank lines and `#` comments are skipped, a leading `scheme://` is
/// stripped, and duplicates are dropped keeping the first occurrence.
pub(crate) fn parse_address_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = match line.find("://") {
                Some(idx) => &line[idx + 3..],
                None => line,
            };
            normalize_address(line)
        })
        .filter(|addr| seen.insert(addr.clone()))
        .collect()
}

/// Validate a `host:port` string, returning it in canonical form.
pub(crate) fn normalize_address(addr: &str) -> Option<String> {
    let url = Url::parse(&format!("http://{}", addr.trim_end_matches('/'))).ok()?;
    if url.path() != "/" || url.query().is_some() {
        return None;
    }
    let host = url.host_str()?;
    // `port()` hides the scheme default, so ask for the explicit port.
    let port = url.port_or_known_default()?;
    if !addr.contains(':') {
        return None;
    }
    Some(format!("{}:{}", host, port))
}
