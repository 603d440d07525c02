use serde::{Deserialize, Serialize};

use crate::backend::{Row, ShardId};

/// Derived state of a cache entry at a point in time. Boundaries are
/// strict: an entry whose `fresh_until` equals now is stale, and one
/// whose `swr_until` equals now is a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Miss,
}

/// A cached result. `version` is the source shard's mutation counter
/// at the time the entry was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    pub version: u64,
    pub fresh_until: i64,
    pub swr_until: i64,
    pub shard_id: ShardId,
}

impl CacheEntry {
    pub fn new(
        data: Vec<u8>,
        version: u64,
        fresh_until: i64,
        swr_until: i64,
        shard_id: ShardId,
    ) -> Self {
        Self {
            data,
            version,
            fresh_until,
            swr_until,
            shard_id,
        }
    }

    pub fn freshness(&self, now_ms: i64) -> Freshness {
        if now_ms < self.fresh_until {
            Freshness::Fresh
        } else if now_ms < self.swr_until {
            Freshness::Stale
        } else {
            Freshness::Miss
        }
    }

    pub fn rows(&self) -> Result<Vec<Row>, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }
}
