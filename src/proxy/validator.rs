//! Syntactic gate for candidate addresses

use once_cell::sync::Lazy;
use regex::Regex;

/// `IPv4:port` at the start of the string. Not anchored at the end, and no
/// range checks on octets or port.
static ADDRESS_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{1,5}")
        .expect("Invalid address prefix regex")
});

/// Check whether a candidate looks like `IPv4:port`
pub fn validate(address: &str) -> bool {
    ADDRESS_PREFIX_REGEX.is_match(address)
}
