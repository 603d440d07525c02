//! Policy persistence. Published versions are immutable; the active
//! pointer moves through a compare-and-swap, which makes the store the
//! gateway's sole strongly-consistent coordination point.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::policy::RoutingPolicy;
use super::Error;
use crate::cache::Kv;

const ACTIVE_KEY: &str = "routing:policy:active";
const VERSION_PREFIX: &str = "routing:policy:v";

const PUBLISH_RETRIES: usize = 16;

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// The single active policy.
    async fn active(&self) -> Result<Arc<RoutingPolicy>, Error>;

    /// Historical lookup. Versions are retained for rollback.
    async fn by_version(&self, version: u64) -> Result<Arc<RoutingPolicy>, Error>;

    /// Compare-and-swap publish: reads the current maximum version and
    /// writes `next` at max+1. Concurrent publishers are serialized;
    /// losers retry internally.
    async fn publish(&self, next: RoutingPolicy) -> Result<u64, Error>;
}

/// Policy store over the KV seam, using the persisted layout
/// `routing:policy:v{version}` plus the `routing:policy:active` pointer.
pub struct KvPolicyStore {
    kv: Arc<dyn Kv>,
    // Last policy observed by this instance. Policy reads are
    // monotonic: a reader never sees a version older than one it
    // already observed.
    last_seen: ArcSwapOption<RoutingPolicy>,
}

impl KvPolicyStore {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self {
            kv,
            last_seen: ArcSwapOption::empty(),
        }
    }

    /// Publish an initial policy if the store is empty. Used at
    /// startup to seed the configured tenant ranges.
    pub async fn ensure_active(&self, initial: RoutingPolicy) -> Result<Arc<RoutingPolicy>, Error> {
        match self.active().await {
            Ok(policy) => Ok(policy),
            Err(Error::NoActivePolicy) => {
                let version = self.publish(initial).await?;
                info!("published initial routing policy v{}", version);
                self.active().await
            }
            Err(err) => Err(err),
        }
    }

    async fn active_version(&self) -> Result<Option<u64>, Error> {
        let bytes = match self.kv.get(ACTIVE_KEY).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        Ok(String::from_utf8_lossy(&bytes).parse().ok())
    }

    fn version_key(version: u64) -> String {
        format!("{}{}", VERSION_PREFIX, version)
    }

    fn remember(&self, policy: Arc<RoutingPolicy>) -> Arc<RoutingPolicy> {
        let previous = self.last_seen.load_full();
        match previous {
            Some(seen) if seen.version > policy.version => seen,
            _ => {
                self.last_seen.store(Some(policy.clone()));
                policy
            }
        }
    }
}

#[async_trait]
impl PolicyStore for KvPolicyStore {
    async fn active(&self) -> Result<Arc<RoutingPolicy>, Error> {
        let version = self
            .active_version()
            .await?
            .ok_or(Error::NoActivePolicy)?;
        let policy = self.by_version(version).await?;
        Ok(self.remember(policy))
    }

    async fn by_version(&self, version: u64) -> Result<Arc<RoutingPolicy>, Error> {
        let bytes = self
            .kv
            .get(&Self::version_key(version))
            .await?
            .ok_or(Error::UnknownVersion(version))?;
        Ok(Arc::new(serde_json::from_slice(&bytes)?))
    }

    async fn publish(&self, mut next: RoutingPolicy) -> Result<u64, Error> {
        for _ in 0..PUBLISH_RETRIES {
            let current = self.active_version().await?;
            let version = current.unwrap_or(0) + 1;
            next.version = version;

            // Version records are immutable: the slot must be unclaimed.
            let record = Bytes::from(serde_json::to_vec(&next)?);
            if !self
                .kv
                .put_if(&Self::version_key(version), None, record)
                .await?
            {
                continue;
            }

            let expected = current.map(|v| Bytes::from(v.to_string()));
            if self
                .kv
                .put_if(ACTIVE_KEY, expected.as_ref(), Bytes::from(version.to_string()))
                .await?
            {
                self.remember(Arc::new(next));
                return Ok(version);
            }

            // Lost the pointer race: release the slot and retry.
            self.kv.delete(&Self::version_key(version)).await?;
        }

        Err(Error::Contention)
    }
}
