//! Credential scrubbing for event properties
//!
//! Events must never carry secrets. Before an event reaches a sink, any
//! property whose key names a credential, or whose string value looks like
//! one, is dropped.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Properties, PropertyValue};

/// Key fragments that mark a property as a credential, matched case-insensitively.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
    "session_id",
    "cookie",
];

macro_rules! secret_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

secret_pattern!(
    RE_JWT,
    r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b"
);
secret_pattern!(RE_BEARER, r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{16,}");
secret_pattern!(
    RE_PRIVATE_KEY,
    r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----"
);
secret_pattern!(RE_AWS_ACCESS_KEY, r"\bAKIA[0-9A-Z]{16}\b");
secret_pattern!(RE_GITHUB_TOKEN, r"\bgh[pousr]_[A-Za-z0-9]{36}\b");
secret_pattern!(RE_STRIPE_KEY, r"\b[sr]k_(?:live|test)_[A-Za-z0-9]{16,}\b");
secret_pattern!(RE_GCP_API_KEY, r"\bAIza[0-9A-Za-z_-]{35}\b");

static VALUE_PATTERNS: &[&LazyLock<Option<Regex>>] = &[
    &RE_JWT,
    &RE_BEARER,
    &RE_PRIVATE_KEY,
    &RE_AWS_ACCESS_KEY,
    &RE_GITHUB_TOKEN,
    &RE_STRIPE_KEY,
    &RE_GCP_API_KEY,
];

/// Returns true if a property key names a credential
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| key.contains(frag))
}

/// Returns true if a string value looks like a credential
pub fn looks_like_secret(value: &str) -> bool {
    VALUE_PATTERNS
        .iter()
        .filter_map(|re| LazyLock::force(*re).as_ref())
        .any(|re| re.is_match(value))
}

/// Remove credential-like properties in place.
///
/// Returns the keys that were dropped so callers can log them.
pub fn scrub(properties: &mut Properties) -> Vec<String> {
    let dropped: Vec<String> = properties
        .iter()
        .filter(|(key, value)| {
            is_sensitive_key(key)
                || matches!(value, PropertyValue::String(s) if looks_like_secret(s))
        })
        .map(|(key, _)| key.clone())
        .collect();

    for key in &dropped {
        properties.remove(key);
    }
    dropped
}
