use serde::{Deserialize, Serialize};

/// A shard actor endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Shard {
    /// Shard name, e.g. "shard-a". Routing policies refer to it.
    pub name: String,
    /// DSN of the shard actor, e.g. "https://shard-a.internal:8155/db".
    pub url: String,
}

/// Tenant prefix fallback for tenants without an explicit
/// routing policy entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TenantRange {
    /// Tenant id prefix, matched in order.
    pub prefix: String,
    /// Owning shard name.
    pub shard: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sharding {
    /// Expected number of shards; validated against the shard list
    /// when set.
    pub shard_count: Option<usize>,
    /// Operator alert threshold for shard data size.
    #[serde(default = "Sharding::max_shard_size_gb")]
    pub max_shard_size_gb: u64,
    /// Bootstrap tenant ranges, scanned in order.
    #[serde(default)]
    pub ranges: Vec<TenantRange>,
}

impl Sharding {
    fn max_shard_size_gb() -> u64 {
        10
    }
}

impl Default for Sharding {
    fn default() -> Self {
        Self {
            shard_count: None,
            max_shard_size_gb: Self::max_shard_size_gb(),
            ranges: vec![],
        }
    }
}
