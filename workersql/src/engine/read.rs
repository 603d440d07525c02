//! Read decision procedure.
//!
//! ```text
//! strong   -> bypass cache; read shard; write-through
//! bounded  -> fresh: serve | stale: serve + refresh | miss: shard + populate
//! cached   -> present: serve (+ refresh if stale)   | miss: shard + populate
//! ```

use tokio_util::sync::CancellationToken;

use super::{Consistency, Engine, Error, ReadOutcome, ReadRequest};
use crate::cache::entry::CacheEntry;
use crate::cache::{key, CacheStatus};
use crate::stats::{counters, Counters};
use crate::util::now_ms;

impl Engine {
    pub async fn read(
        &self,
        request: ReadRequest,
        token: &CancellationToken,
    ) -> Result<ReadOutcome, Error> {
        let route = self.policy.active().await?.resolve(&request.tenant)?;
        let shard = route.primary().clone();
        let fingerprint = key::fingerprint(&request.statement.sql, &request.statement.params);
        let cache_key = key::query(&request.tenant, &request.table, fingerprint);

        match request.consistency {
            Consistency::Strong => {
                let result = self
                    .client
                    .execute(&shard, &request.statement, request.deadline, token)
                    .await?;
                Counters::incr(&counters().shard_reads);
                self.cache
                    .put(
                        &cache_key,
                        &result.rows,
                        self.fresh_ms,
                        self.swr_ms,
                        &shard,
                        result.version,
                    )
                    .await;
                Ok(ReadOutcome {
                    rows: result.rows,
                    cached: false,
                    version: result.version,
                    shard,
                })
            }

            Consistency::Bounded { max_stale_ms } => match self.cache.get(&cache_key).await {
                CacheStatus::Fresh(entry) => {
                    // A fresh value wins even when a refresh for this
                    // key is in flight; no second refresh is triggered.
                    Counters::incr(&counters().cache_hits);
                    self.serve(entry, &request, &cache_key, token, false).await
                }
                CacheStatus::Stale(entry)
                    if within_staleness_bound(&entry, max_stale_ms) =>
                {
                    Counters::incr(&counters().cache_stale_serves);
                    self.serve(entry, &request, &cache_key, token, true).await
                }
                _ => self.read_through(&request, &cache_key, token).await,
            },

            Consistency::Cached => match self.cache.get(&cache_key).await {
                CacheStatus::Fresh(entry) => {
                    Counters::incr(&counters().cache_hits);
                    self.serve(entry, &request, &cache_key, token, false).await
                }
                CacheStatus::Stale(entry) => {
                    Counters::incr(&counters().cache_stale_serves);
                    self.serve(entry, &request, &cache_key, token, true).await
                }
                CacheStatus::Miss => self.read_through(&request, &cache_key, token).await,
            },
        }
    }

    /// Serve a cache entry, optionally scheduling a background refresh.
    /// Undecodable entries fall through to the shard.
    async fn serve(
        &self,
        entry: CacheEntry,
        request: &ReadRequest,
        cache_key: &str,
        token: &CancellationToken,
        refresh: bool,
    ) -> Result<ReadOutcome, Error> {
        let rows = match entry.rows() {
            Ok(rows) => rows,
            Err(_) => return self.read_through(request, cache_key, token).await,
        };

        if refresh {
            self.refresher.schedule(
                cache_key.to_string(),
                request.statement.clone(),
                entry.shard_id.clone(),
                &request.tenant,
                &request.table,
            );
        }

        Ok(ReadOutcome {
            rows,
            cached: true,
            version: entry.version,
            shard: entry.shard_id,
        })
    }

    async fn read_through(
        &self,
        request: &ReadRequest,
        cache_key: &str,
        token: &CancellationToken,
    ) -> Result<ReadOutcome, Error> {
        Counters::incr(&counters().cache_misses);
        let route = self.policy.active().await?.resolve(&request.tenant)?;
        let shard = route.primary().clone();

        let result = self
            .client
            .execute(&shard, &request.statement, request.deadline, token)
            .await?;
        Counters::incr(&counters().shard_reads);

        self.cache
            .put(
                cache_key,
                &result.rows,
                self.fresh_ms,
                self.swr_ms,
                &shard,
                result.version,
            )
            .await;

        Ok(ReadOutcome {
            rows: result.rows,
            cached: false,
            version: result.version,
            shard,
        })
    }
}

/// `bounded N` serves entries at most N milliseconds past their
/// freshness deadline. Without N any entry inside the SWR window
/// qualifies.
fn within_staleness_bound(entry: &CacheEntry, max_stale_ms: Option<u64>) -> bool {
    match max_stale_ms {
        Some(ms) => now_ms() - entry.fresh_until <= ms as i64,
        None => true,
    }
}
