use serde::{Deserialize, Serialize};

/// Per-shard circuit breaker tuning.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Breaker {
    /// Open the circuit after this many failures inside the window.
    #[serde(default = "Breaker::failure_threshold")]
    pub failure_threshold: usize,
    /// Sliding window over which failures accumulate, in milliseconds.
    #[serde(default = "Breaker::window_ms")]
    pub window_ms: u64,
    /// How long an open circuit rejects calls before probing,
    /// in milliseconds.
    #[serde(default = "Breaker::cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Breaker {
    fn failure_threshold() -> usize {
        5
    }

    fn window_ms() -> u64 {
        60_000
    }

    fn cooldown_ms() -> u64 {
        30_000
    }
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            failure_threshold: Self::failure_threshold(),
            window_ms: Self::window_ms(),
            cooldown_ms: Self::cooldown_ms(),
        }
    }
}
