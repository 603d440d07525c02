use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct General {
    /// Run on this address.
    #[serde(default = "General::host")]
    pub host: String,
    /// Run on this port.
    #[serde(default = "General::port")]
    pub port: u16,
    /// Spawn this many Tokio threads.
    #[serde(default = "General::workers")]
    pub workers: usize,
    /// End-to-end deadline for a foreground request, in milliseconds.
    #[serde(default = "General::query_timeout")]
    pub query_timeout: u64,
    /// Shard connect timeout, in milliseconds.
    #[serde(default = "General::connect_timeout")]
    pub connect_timeout: u64,
    /// Attempt shard calls multiple times on transient errors.
    #[serde(default = "General::retry_attempts")]
    pub retry_attempts: u64,
    /// Base delay between retries, in milliseconds.
    #[serde(default = "General::retry_base_delay")]
    pub retry_base_delay: u64,
    /// Upper bound on a single retry delay, in milliseconds.
    #[serde(default = "General::retry_max_delay")]
    pub retry_max_delay: u64,
    /// HTTP health check port.
    pub healthcheck_port: Option<u16>,
    /// Enable OpenMetrics server on this port.
    pub openmetrics_port: Option<u16>,
    /// OpenMetrics prefix.
    pub openmetrics_namespace: Option<String>,
    /// Shutdown timeout, in milliseconds.
    #[serde(default = "General::shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Concurrent background cache refreshes per (tenant, table).
    #[serde(default = "General::refresh_concurrency")]
    pub refresh_concurrency: usize,
    /// How long the tail replay waits for the source event log to stay
    /// empty before declaring itself caught up, in milliseconds.
    #[serde(default = "General::tail_settle_interval")]
    pub tail_settle_interval: u64,
    /// Reject INSERT statements without a column list instead of
    /// passing them through with a warning.
    #[serde(default)]
    pub strict_isolation: bool,
    /// Classifier result cache size.
    #[serde(default = "General::classifier_cache_size")]
    pub classifier_cache_size: usize,
    /// Log statements to this file (warning: slow, don't use in
    /// production).
    #[serde(default)]
    pub query_log: Option<PathBuf>,
}

impl General {
    fn host() -> String {
        "0.0.0.0".into()
    }

    fn port() -> u16 {
        8155
    }

    fn workers() -> usize {
        2
    }

    fn query_timeout() -> u64 {
        30_000
    }

    fn connect_timeout() -> u64 {
        5_000
    }

    fn retry_attempts() -> u64 {
        3
    }

    fn retry_base_delay() -> u64 {
        100
    }

    fn retry_max_delay() -> u64 {
        2_000
    }

    fn shutdown_timeout() -> u64 {
        5_000
    }

    fn refresh_concurrency() -> usize {
        4
    }

    fn tail_settle_interval() -> u64 {
        1_000
    }

    fn classifier_cache_size() -> usize {
        1_024
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            host: Self::host(),
            port: Self::port(),
            workers: Self::workers(),
            query_timeout: Self::query_timeout(),
            connect_timeout: Self::connect_timeout(),
            retry_attempts: Self::retry_attempts(),
            retry_base_delay: Self::retry_base_delay(),
            retry_max_delay: Self::retry_max_delay(),
            healthcheck_port: None,
            openmetrics_port: None,
            openmetrics_namespace: None,
            shutdown_timeout: Self::shutdown_timeout(),
            refresh_concurrency: Self::refresh_concurrency(),
            tail_settle_interval: Self::tail_settle_interval(),
            strict_isolation: false,
            classifier_cache_size: Self::classifier_cache_size(),
            query_log: None,
        }
    }
}
