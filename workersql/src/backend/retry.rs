//! Retry schedule for transient shard errors.

use std::time::Duration;

use rand::Rng;
use workersql_config::General;

/// Exponential backoff with equal jitter, capped.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub attempts: u64,
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(attempts: u64, base: Duration, cap: Duration) -> Self {
        Self { attempts, base, cap }
    }

    pub fn from_config(general: &General) -> Self {
        Self::new(
            general.retry_attempts,
            Duration::from_millis(general.retry_base_delay),
            Duration::from_millis(general.retry_max_delay),
        )
    }

    /// Delay before the given retry attempt (0-based).
    pub fn delay(&self, attempt: u64) -> Duration {
        let exp = self
            .base
            .saturating_mul(1u32 << attempt.min(16) as u32)
            .min(self.cap);
        let half = exp / 2;
        let jitter = rand::rng().random_range(Duration::ZERO..=half);
        half + jitter
    }
}
