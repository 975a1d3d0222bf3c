//! Hostname extraction and normalization.
//!
//! Host header values and SNI names are normalized the same way before
//! they key any cache: lower-cased, trailing dot stripped, port removed.
//! Names arrive on the wire already IDN-encoded (punycode), so ASCII
//! lowering is sufficient.

/// Normalizes a hostname for cache keying. Returns `None` when the value
/// cannot be a hostname at all.
///
/// # Examples
///
/// ```rust
/// use origan_gateway::host::normalize_hostname;
///
/// assert_eq!(
///     normalize_hostname("Foo.App.Example:7778"),
///     Some("foo.app.example".to_string())
/// );
/// assert_eq!(normalize_hostname("not a host"), None);
/// ```
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let host = raw.trim().trim_end_matches('.');
    let host = strip_port(host)?;
    if host.is_empty() || host.len() > 253 {
        return None;
    }
    let mut normalized = String::with_capacity(host.len());
    for c in host.chars() {
        match c {
            'A'..='Z' => normalized.push(c.to_ascii_lowercase()),
            'a'..='z' | '0'..='9' | '-' | '.' => normalized.push(c),
            _ => return None,
        }
    }
    if normalized.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return None;
    }
    Some(normalized)
}

/// Drops a `:port` suffix. IPv6 literals are not valid customer domains
/// and are rejected outright.
fn strip_port(host: &str) -> Option<&str> {
    if host.starts_with('[') {
        return None;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => Some(name),
        Some(_) => None,
        None => Some(host),
    }
}
