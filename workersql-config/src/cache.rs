use serde::{Deserialize, Serialize};

/// Cache freshness windows. Both are extended per-request
/// by consistency hints.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct CacheSettings {
    /// How long a cache entry serves without a shard roundtrip,
    /// in milliseconds.
    #[serde(default = "CacheSettings::ttl_ms")]
    pub ttl_ms: u64,
    /// Stale-while-revalidate window after freshness expires,
    /// in milliseconds.
    #[serde(default = "CacheSettings::swr_ms")]
    pub swr_ms: u64,
}

impl CacheSettings {
    fn ttl_ms() -> u64 {
        30_000
    }

    fn swr_ms() -> u64 {
        120_000
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: Self::ttl_ms(),
            swr_ms: Self::swr_ms(),
        }
    }
}
