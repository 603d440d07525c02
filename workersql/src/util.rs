//! What's a project without a util module.

use std::time::{Duration, Instant};

use chrono::Utc;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Escape a string for embedding in a single-quoted SQL literal.
pub fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

/// Convert Duration to milliseconds with 3 decimal places precision.
pub fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1_000_000.0).round() / 1000.0
}

/// Get a human-readable duration for amounts that
/// a human would use.
pub fn human_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    let second = 1000;
    let minute = second * 60;
    let hour = minute * 60;

    if ms < second {
        format!("{}ms", ms)
    } else if ms < minute {
        format!("{:.1}s", ms as f64 / second as f64)
    } else if ms < hour {
        format!("{:.1}m", ms as f64 / minute as f64)
    } else {
        format!("{:.1}h", ms as f64 / hour as f64)
    }
}

/// A request deadline. Propagated into every downstream call and
/// checked at each suspension point.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Time left before expiry. Zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining() == Duration::ZERO
    }
}
