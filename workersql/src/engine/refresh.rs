//! Background cache refresh. Fire-and-forget, coalesced per cache key
//! (at most one in-flight build per fingerprint) and bounded per
//! (tenant, table) by a semaphore budget. A failed refresh leaves the
//! stale entry in place until its SWR window lapses.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use workersql_config::CacheSettings;

use crate::backend::{ShardClient, ShardId, Statement};
use crate::cache::Cache;
use crate::routing::TenantId;
use crate::stats::{counters, Counters};
use crate::util::Deadline;

#[derive(Clone)]
pub struct Refresher {
    cache: Cache,
    client: ShardClient,
    in_flight: Arc<DashMap<String, ()>>,
    budgets: Arc<DashMap<(TenantId, String), Arc<Semaphore>>>,
    per_table: usize,
    fresh_ms: u64,
    swr_ms: u64,
    timeout_ms: u64,
    shutdown: CancellationToken,
}

impl Refresher {
    pub fn new(
        cache: Cache,
        client: ShardClient,
        settings: &CacheSettings,
        per_table: usize,
        timeout_ms: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            client,
            in_flight: Arc::new(DashMap::new()),
            budgets: Arc::new(DashMap::new()),
            per_table: per_table.max(1),
            fresh_ms: settings.ttl_ms,
            swr_ms: settings.swr_ms,
            timeout_ms,
            shutdown,
        }
    }

    /// Number of refreshes currently building.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Schedule a refresh for one cache key. Duplicate requests for a
    /// key already building are coalesced; requests over the
    /// per-(tenant, table) budget are dropped.
    pub fn schedule(
        &self,
        cache_key: String,
        statement: Statement,
        shard: ShardId,
        tenant: &TenantId,
        table: &str,
    ) {
        if self.in_flight.insert(cache_key.clone(), ()).is_some() {
            Counters::incr(&counters().refreshes_coalesced);
            return;
        }

        let semaphore = self
            .budgets
            .entry((tenant.clone(), table.to_string()))
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_table)))
            .clone();

        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.in_flight.remove(&cache_key);
                Counters::incr(&counters().refreshes_skipped);
                return;
            }
        };

        Counters::incr(&counters().refreshes);
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let deadline = Deadline::after(Duration::from_millis(this.timeout_ms));

            match this
                .client
                .execute(&shard, &statement, deadline, &this.shutdown)
                .await
            {
                Ok(result) => {
                    this.cache
                        .put(
                            &cache_key,
                            &result.rows,
                            this.fresh_ms,
                            this.swr_ms,
                            &shard,
                            result.version,
                        )
                        .await;
                    debug!("refreshed {} at version {}", cache_key, result.version);
                }
                Err(err) => {
                    // Stale entry stays until swr_until.
                    warn!("background refresh failed for {}: {}", cache_key, err);
                }
            }

            this.in_flight.remove(&cache_key);
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{Backoff, Breakers, MemoryShard, ShardTransport};
    use crate::cache::{CacheStatus, MemoryKv};

    fn refresher(client: ShardClient) -> (Refresher, Cache) {
        let cache = Cache::new(Arc::new(MemoryKv::new()));
        let refresher = Refresher::new(
            cache.clone(),
            client,
            &CacheSettings::default(),
            2,
            5_000,
            CancellationToken::new(),
        );
        (refresher, cache)
    }

    fn client_with_shard() -> (ShardClient, MemoryShard) {
        let client = ShardClient::new(
            Breakers::new(Default::default()),
            Backoff::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        );
        let shard = MemoryShard::new("shard-a");
        client.add_shard("shard-a".into(), Arc::new(shard.clone()));
        (client, shard)
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let (client, shard) = client_with_shard();
        shard
            .execute(&Statement::new(
                "INSERT INTO users (id, name, tenant_id) VALUES (1, 'ada', 't1')",
            ))
            .await
            .unwrap();

        let (refresher, cache) = refresher(client);
        refresher.schedule(
            "t1:q:users:k".into(),
            Statement::new("SELECT * FROM users WHERE tenant_id = 't1'"),
            "shard-a".into(),
            &"t1".into(),
            "users",
        );

        // Wait for the fire-and-forget task.
        for _ in 0..50 {
            if refresher.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        match cache.get("t1:q:users:k").await {
            CacheStatus::Fresh(entry) => {
                assert_eq!(entry.version, 1);
                assert_eq!(entry.rows().unwrap().len(), 1);
            }
            other => panic!("expected fresh entry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_refreshes_coalesce() {
        let (client, _shard) = client_with_shard();
        let (refresher, _cache) = refresher(client);

        let before = crate::stats::counters()
            .refreshes_coalesced
            .load(std::sync::atomic::Ordering::Relaxed);

        for _ in 0..5 {
            refresher.schedule(
                "t1:q:users:same".into(),
                Statement::new("SELECT * FROM users WHERE tenant_id = 't1'"),
                "shard-a".into(),
                &"t1".into(),
                "users",
            );
        }

        let after = crate::stats::counters()
            .refreshes_coalesced
            .load(std::sync::atomic::Ordering::Relaxed);
        assert!(after > before, "duplicates should coalesce");
    }
}
