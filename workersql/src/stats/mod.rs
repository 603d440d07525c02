//! Gateway counters and their OpenMetrics rendering.

pub mod http_server;
pub mod open_metric;

pub use open_metric::{Measurement, Metric, OpenMetric};

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

/// Process-wide counters. Incremented from hot paths with relaxed
/// ordering; read by the metrics endpoint.
#[derive(Debug, Default)]
pub struct Counters {
    pub cache_hits: AtomicU64,
    pub cache_stale_serves: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_errors: AtomicU64,
    pub shard_reads: AtomicU64,
    pub shard_writes: AtomicU64,
    pub mirror_errors: AtomicU64,
    pub breaker_rejections: AtomicU64,
    pub retries: AtomicU64,
    pub refreshes: AtomicU64,
    pub refreshes_coalesced: AtomicU64,
    pub refreshes_skipped: AtomicU64,
    pub invalidations: AtomicU64,
    pub invalidation_retries: AtomicU64,
    pub dead_letters: AtomicU64,
    pub idempotent_replays: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

/// Get the process-wide counters.
pub fn counters() -> &'static Counters {
    &COUNTERS
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        vec![
            ("cache_hits", get(&self.cache_hits)),
            ("cache_stale_serves", get(&self.cache_stale_serves)),
            ("cache_misses", get(&self.cache_misses)),
            ("cache_errors", get(&self.cache_errors)),
            ("shard_reads", get(&self.shard_reads)),
            ("shard_writes", get(&self.shard_writes)),
            ("mirror_errors", get(&self.mirror_errors)),
            ("breaker_rejections", get(&self.breaker_rejections)),
            ("retries", get(&self.retries)),
            ("refreshes", get(&self.refreshes)),
            ("refreshes_coalesced", get(&self.refreshes_coalesced)),
            ("refreshes_skipped", get(&self.refreshes_skipped)),
            ("invalidations", get(&self.invalidations)),
            ("invalidation_retries", get(&self.invalidation_retries)),
            ("dead_letters", get(&self.dead_letters)),
            ("idempotent_replays", get(&self.idempotent_replays)),
        ]
    }
}

struct CounterMetric {
    name: String,
    value: u64,
}

impl OpenMetric for CounterMetric {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn metric_type(&self) -> String {
        "counter".into()
    }

    fn measurements(&self) -> Vec<Measurement> {
        vec![Measurement {
            labels: vec![],
            measurement: self.value as f64,
        }]
    }
}

/// Render all counters in the OpenMetrics text format.
pub fn render(namespace: Option<&str>) -> String {
    let prefix = namespace
        .map(|ns| format!("{}_", ns))
        .unwrap_or_else(|| "workersql_".into());

    counters()
        .snapshot()
        .into_iter()
        .map(|(name, value)| {
            Metric::new(CounterMetric {
                name: format!("{}{}", prefix, name),
                value,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("")
}
