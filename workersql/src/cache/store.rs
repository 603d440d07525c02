//! The cache facade. Lookups report freshness; writes are best-effort
//! and never block the foreground path.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use super::entry::{CacheEntry, Freshness};
use super::kv::Kv;
use super::Error;
use crate::backend::{Row, ShardId};
use crate::stats::{counters, Counters};
use crate::util::now_ms;

const LIST_PAGE: usize = 128;

#[derive(Debug)]
pub enum CacheStatus {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Miss,
}

#[derive(Clone)]
pub struct Cache {
    kv: Arc<dyn Kv>,
}

impl Cache {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> Arc<dyn Kv> {
        self.kv.clone()
    }

    /// Look up an entry and derive its freshness. KV failures degrade
    /// to a miss so callers fall through to the owning shard.
    pub async fn get(&self, key: &str) -> CacheStatus {
        let bytes = match self.kv.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CacheStatus::Miss,
            Err(err) => {
                warn!("cache read degraded to shard query: {}", err);
                Counters::incr(&counters().cache_errors);
                return CacheStatus::Miss;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("dropping undecodable cache entry {}: {}", key, err);
                let _ = self.kv.delete(key).await;
                return CacheStatus::Miss;
            }
        };

        match entry.freshness(now_ms()) {
            Freshness::Fresh => CacheStatus::Fresh(entry),
            Freshness::Stale => CacheStatus::Stale(entry),
            Freshness::Miss => CacheStatus::Miss,
        }
    }

    /// Store rows under a key. Best-effort: failures are logged and
    /// counted, never surfaced.
    pub async fn put(
        &self,
        key: &str,
        rows: &[Row],
        fresh_ms: u64,
        swr_ms: u64,
        shard_id: &ShardId,
        version: u64,
    ) {
        let now = now_ms();
        let entry = CacheEntry::new(
            match serde_json::to_vec(rows) {
                Ok(data) => data,
                Err(err) => {
                    warn!("cache write skipped for {}: {}", key, err);
                    return;
                }
            },
            version,
            now + fresh_ms as i64,
            now + (fresh_ms + swr_ms) as i64,
            shard_id.clone(),
        );

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                warn!("cache write skipped for {}: {}", key, err);
                return;
            }
        };

        let ttl = Duration::from_millis(fresh_ms + swr_ms);
        if let Err(err) = self.kv.put(key, bytes, Some(ttl)).await {
            warn!("cache write failed for {}: {}", key, err);
            Counters::incr(&counters().cache_errors);
        }
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), Error> {
        self.kv.delete(key).await
    }

    /// Delete every key under a prefix, iterating the KV list interface
    /// and deleting in batches. Returns the number of keys removed.
    pub async fn invalidate_by_pattern(&self, prefix: &str) -> Result<u64, Error> {
        let mut removed = 0;
        let mut cursor: Option<String> = None;

        loop {
            let page = self.kv.list(prefix, cursor.as_deref(), LIST_PAGE).await?;
            if page.keys.is_empty() {
                break;
            }
            removed += page.keys.len() as u64;
            self.kv.delete_many(&page.keys).await?;
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(removed)
    }

    /// Extend an entry's freshness window, only if it is still present.
    pub async fn touch(&self, key: &str, fresh_ms: u64) -> Result<(), Error> {
        let bytes = match self.kv.get(key).await? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        let mut entry: CacheEntry = serde_json::from_slice(&bytes)?;

        let now = now_ms();
        entry.fresh_until = now + fresh_ms as i64;
        // The SWR window never ends before freshness does.
        entry.swr_until = entry.swr_until.max(entry.fresh_until);

        let ttl = Duration::from_millis((entry.swr_until - now).max(0) as u64);
        self.kv
            .put(key, Bytes::from(serde_json::to_vec(&entry)?), Some(ttl))
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::MemoryKv;

    fn rows() -> Vec<Row> {
        let mut row = Row::new();
        row.insert("id".into(), 1.into());
        vec![row]
    }

    fn cache() -> (Cache, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        (Cache::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn test_put_get_fresh() {
        let (cache, _) = cache();
        cache
            .put("t1:q:users:abc", &rows(), 30_000, 120_000, &"shard-a".into(), 7)
            .await;

        match cache.get("t1:q:users:abc").await {
            CacheStatus::Fresh(entry) => {
                assert_eq!(entry.version, 7);
                assert_eq!(entry.rows().unwrap().len(), 1);
            }
            other => panic!("expected fresh, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_fresh_is_stale() {
        let (cache, _) = cache();
        cache
            .put("k", &rows(), 0, 120_000, &"shard-a".into(), 1)
            .await;
        assert!(matches!(cache.get("k").await, CacheStatus::Stale(_)));
    }

    #[tokio::test]
    async fn test_expired_is_miss() {
        let (cache, _) = cache();
        cache.put("k", &rows(), 0, 0, &"shard-a".into(), 1).await;
        assert!(matches!(cache.get("k").await, CacheStatus::Miss));
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let (cache, _) = cache();
        for i in 0..300 {
            cache
                .put(
                    &format!("t1:q:users:{:03}", i),
                    &rows(),
                    30_000,
                    0,
                    &"shard-a".into(),
                    1,
                )
                .await;
        }
        cache
            .put("t1:q:orders:0", &rows(), 30_000, 0, &"shard-a".into(), 1)
            .await;

        let removed = cache.invalidate_by_pattern("t1:q:users:").await.unwrap();
        assert_eq!(removed, 300);
        assert!(matches!(cache.get("t1:q:users:000").await, CacheStatus::Miss));
        assert!(matches!(cache.get("t1:q:orders:0").await, CacheStatus::Fresh(_)));
    }

    #[tokio::test]
    async fn test_touch_extends_freshness() {
        let (cache, _) = cache();
        cache.put("k", &rows(), 0, 120_000, &"shard-a".into(), 1).await;
        assert!(matches!(cache.get("k").await, CacheStatus::Stale(_)));

        cache.touch("k", 30_000).await.unwrap();
        assert!(matches!(cache.get("k").await, CacheStatus::Fresh(_)));

        // Touching a missing key is a no-op.
        cache.touch("absent", 30_000).await.unwrap();
        assert!(matches!(cache.get("absent").await, CacheStatus::Miss));
    }

    #[tokio::test]
    async fn test_unavailable_kv_degrades_to_miss() {
        let (cache, kv) = cache();
        cache.put("k", &rows(), 30_000, 0, &"shard-a".into(), 1).await;

        kv.set_unavailable(true);
        assert!(matches!(cache.get("k").await, CacheStatus::Miss));
        // Writes don't surface errors either.
        cache.put("k2", &rows(), 30_000, 0, &"shard-a".into(), 1).await;
    }
}
