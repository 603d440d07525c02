//! The consistency engine: per-hint read paths over cache and shard,
//! the write path with dual-write mirroring and invalidation events,
//! and background stale-while-revalidate refreshes.

pub mod error;
pub mod read;
pub mod refresh;
pub mod write;

pub use error::Error;
pub use refresh::Refresher;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use workersql_config::Config;

use crate::backend::{Row, ShardClient, ShardId, Statement};
use crate::cache::Cache;
use crate::queue::Queue;
use crate::routing::{PolicyStore, TenantId};
use crate::util::Deadline;

/// Resolved consistency mode for one read. The classifier's `default`
/// hint resolves to `Bounded` before reaching the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Bypass the cache, read the owning shard, write through.
    Strong,
    /// Serve fresh entries; serve stale ones no older than
    /// `max_stale_ms` past freshness while a refresh runs.
    Bounded { max_stale_ms: Option<u64> },
    /// Serve anything inside the SWR window.
    Cached,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub tenant: TenantId,
    pub table: String,
    pub statement: Statement,
    pub consistency: Consistency,
    pub deadline: Deadline,
}

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub tenant: TenantId,
    pub table: Option<String>,
    pub statement: Statement,
    pub deadline: Deadline,
}

/// What a read produced and where it came from.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub rows: Vec<Row>,
    pub cached: bool,
    pub version: u64,
    pub shard: ShardId,
}

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub result: crate::backend::ExecuteResult,
    pub shard: ShardId,
}

pub struct Engine {
    pub(crate) cache: Cache,
    pub(crate) policy: Arc<dyn PolicyStore>,
    pub(crate) client: ShardClient,
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) refresher: Refresher,
    pub(crate) fresh_ms: u64,
    pub(crate) swr_ms: u64,
}

impl Engine {
    pub fn new(
        cache: Cache,
        policy: Arc<dyn PolicyStore>,
        client: ShardClient,
        queue: Arc<dyn Queue>,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Self {
        let refresher = Refresher::new(
            cache.clone(),
            client.clone(),
            &config.cache,
            config.general.refresh_concurrency,
            config.general.query_timeout,
            shutdown,
        );
        Self {
            cache,
            policy,
            client,
            queue,
            refresher,
            fresh_ms: config.cache.ttl_ms,
            swr_ms: config.cache.swr_ms,
        }
    }

    pub fn client(&self) -> &ShardClient {
        &self.client
    }

    pub fn policy(&self) -> &Arc<dyn PolicyStore> {
        &self.policy
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}
