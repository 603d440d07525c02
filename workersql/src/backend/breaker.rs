//! Per-shard circuit breaker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::warn;
use workersql_config::Breaker as Settings;

use super::shard::ShardId;
use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failures: VecDeque<Instant>,
}

/// Breaker for one shard. `closed` accumulates failures inside a
/// sliding window; the threshold-th failure opens the circuit. Open
/// circuits reject until the cooldown elapses, then a single probe is
/// let through in `half_open`.
#[derive(Debug, Clone)]
pub struct Breaker {
    shard: ShardId,
    inner: Arc<RwLock<Inner>>,
    settings: Settings,
}

impl Breaker {
    pub fn new(shard: ShardId, settings: Settings) -> Self {
        Self {
            shard,
            inner: Arc::new(RwLock::new(Inner {
                state: State::Closed,
                failures: VecDeque::new(),
            })),
            settings,
        }
    }

    /// Admission check. Transitions open circuits to half-open once
    /// the cooldown has elapsed, admitting exactly one probe.
    pub fn check(&self) -> Result<(), Error> {
        let mut guard = self.inner.write();
        match guard.state {
            State::Closed => Ok(()),
            State::Open { since } => {
                if since.elapsed() >= Duration::from_millis(self.settings.cooldown_ms) {
                    guard.state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(Error::CircuitOpen(self.shard.clone()))
                }
            }
            // A probe is already in flight.
            State::HalfOpen => Err(Error::CircuitOpen(self.shard.clone())),
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.inner.write();
        guard.state = State::Closed;
        guard.failures.clear();
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut guard = self.inner.write();
        match guard.state {
            State::HalfOpen => {
                warn!("circuit for shard \"{}\" re-opened by probe failure", self.shard);
                guard.state = State::Open { since: now };
            }
            State::Open { .. } => (),
            State::Closed => {
                let window = Duration::from_millis(self.settings.window_ms);
                guard.failures.push_back(now);
                while let Some(first) = guard.failures.front() {
                    if now.duration_since(*first) > window {
                        guard.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if guard.failures.len() >= self.settings.failure_threshold {
                    warn!("circuit for shard \"{}\" opened", self.shard);
                    guard.state = State::Open { since: now };
                    guard.failures.clear();
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.inner.read().state, State::Closed)
    }

    pub fn state_name(&self) -> &'static str {
        match self.inner.read().state {
            State::Closed => "closed",
            State::Open { .. } => "open",
            State::HalfOpen => "half_open",
        }
    }
}

/// Breaker registry, one per shard, created on first use.
#[derive(Debug, Clone)]
pub struct Breakers {
    map: Arc<DashMap<ShardId, Breaker>>,
    settings: Settings,
}

impl Breakers {
    pub fn new(settings: Settings) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            settings,
        }
    }

    pub fn get(&self, shard: &ShardId) -> Breaker {
        self.map
            .entry(shard.clone())
            .or_insert_with(|| Breaker::new(shard.clone(), self.settings))
            .clone()
    }

    /// Snapshot of all breaker states, for health and metrics.
    pub fn states(&self) -> Vec<(ShardId, &'static str)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state_name()))
            .collect()
    }

    /// True when every registered breaker is open. An empty registry
    /// reports healthy.
    pub fn all_open(&self) -> bool {
        !self.map.is_empty() && self.map.iter().all(|entry| entry.value().is_open())
    }
}
