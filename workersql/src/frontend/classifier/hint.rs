//! Consistency hint directives. A leading block comment of the form
//! `/*+ strong */`, `/*+ bounded N */` or `/*+ weak */` selects the
//! read path; statements without one resolve to the engine default.

use once_cell::sync::Lazy;
use regex::Regex;

static HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*/\*\+\s*(strong|weak|bounded)(?:\s+(\d+))?\s*\*/").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Strong,
    /// Bounded staleness, optionally capped at N milliseconds.
    Bounded(Option<u64>),
    /// The `weak` directive: anything inside the SWR window serves.
    Cached,
    Default,
}

/// Remove the leading directive so shards never see it and hinted
/// variants of a statement share one cache fingerprint.
pub fn strip(sql: &str) -> &str {
    match HINT.find(sql) {
        Some(found) => sql[found.end()..].trim_start(),
        None => sql,
    }
}

pub fn extract(sql: &str) -> Hint {
    let captures = match HINT.captures(sql) {
        Some(captures) => captures,
        None => return Hint::Default,
    };

    match captures[1].to_ascii_lowercase().as_str() {
        "strong" => Hint::Strong,
        "weak" => Hint::Cached,
        "bounded" => Hint::Bounded(captures.get(2).and_then(|m| m.as_str().parse().ok())),
        _ => Hint::Default,
    }
}
