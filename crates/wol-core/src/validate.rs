//! Syntax checks for MAC and IPv4 address strings.
//!
//! Both functions are pure and total: they never panic and have no side effects.

use std::sync::OnceLock;

use regex::Regex;

/// Six hex pairs separated uniformly by `:` or by `-`.
const MAC_PATTERN: &str =
    r"^(?:[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}|[0-9A-Fa-f]{2}(?:-[0-9A-Fa-f]{2}){5})$";

static MAC_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn mac_regex() -> Option<&'static Regex> {
    MAC_RE.get_or_init(|| Regex::new(MAC_PATTERN).ok()).as_ref()
}

/// Returns true if `s` is a MAC-48 address in `XX:XX:XX:XX:XX:XX` or
/// `XX-XX-XX-XX-XX-XX` form (case-insensitive).
///
/// Mixed separators such as `00:11-22:33:44:55` are rejected.
pub fn validate_mac(s: &str) -> bool {
    mac_regex().is_some_and(|re| re.is_match(s))
}

/// Returns true if `s` is exactly four dot-separated decimal octets in 0-255.
///
/// Each component must parse as an integer; surrounding whitespace is not
/// accepted.
pub fn validate_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|part| part.parse::<u8>().is_ok())
}
