//! Invalidation consumer. Expands each event's base keys into query
//! and entity prefixes, unions them across the batch, and clears them
//! in parallel. Idempotency markers make redeliveries no-ops, so the
//! bus's at-least-once delivery becomes effectively-once for cache
//! state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use workersql_config::Limits;

use super::event::Event;
use super::{Error, Queue};
use crate::backend::Backoff;
use crate::cache::{key, Cache, Kv};
use crate::stats::{counters, Counters};

const RECEIVE_WAIT: Duration = Duration::from_millis(250);

pub struct InvalidationConsumer {
    queue: Arc<dyn Queue>,
    cache: Cache,
    markers: Arc<dyn Kv>,
    batch_size: usize,
    max_retries: u32,
    marker_ttl: Duration,
    backoff: Backoff,
}

impl InvalidationConsumer {
    pub fn new(
        queue: Arc<dyn Queue>,
        cache: Cache,
        markers: Arc<dyn Kv>,
        limits: &Limits,
        backoff: Backoff,
    ) -> Self {
        Self {
            queue,
            cache,
            markers,
            batch_size: limits.queue_batch_size,
            max_retries: limits.queue_max_retries,
            // Markers must outlive message retention.
            marker_ttl: Duration::from_millis(limits.idempotency_ttl),
            backoff,
        }
    }

    /// Consume until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            select! {
                biased;
                _ = token.cancelled() => break,
                result = self.process_batch() => {
                    if let Err(err) = result {
                        error!("invalidation batch failed: {}", err);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
        debug!("invalidation consumer shutting down");
    }

    fn marker_key(id: &str) -> String {
        format!("idem:queue:{}", id)
    }

    /// One receive/invalidate/ack round. Returns the number of
    /// messages settled.
    pub async fn process_batch(&self) -> Result<usize, Error> {
        let messages = self.queue.receive(self.batch_size, RECEIVE_WAIT).await?;
        if messages.is_empty() {
            return Ok(0);
        }

        // Skip redeliveries already applied. A marker read failure
        // counts as unseen: invalidating twice is harmless.
        let mut fresh = vec![];
        for message in messages {
            let seen = matches!(
                self.markers.get(&Self::marker_key(&message.id)).await,
                Ok(Some(_))
            );
            if seen {
                Counters::incr(&counters().idempotent_replays);
                self.queue.ack(&message.id).await?;
            } else {
                fresh.push(message);
            }
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        // Union prefixes across the batch so overlapping events clear
        // each prefix once.
        let mut prefixes = BTreeSet::new();
        for message in &fresh {
            let Event::Invalidate { tenant, tables } = &message.event;
            for table in tables {
                prefixes.insert(key::query_prefix(tenant, table));
                prefixes.insert(key::entity_prefix(tenant, table));
            }
        }

        let results = join_all(
            prefixes
                .iter()
                .map(|prefix| self.cache.invalidate_by_pattern(prefix)),
        )
        .await;

        let failed = results.iter().any(|result| result.is_err());
        if !failed {
            let settled = fresh.len();
            for message in fresh {
                let marker = Self::marker_key(&message.id);
                if let Err(err) = self
                    .markers
                    .put(&marker, Bytes::from_static(b"1"), Some(self.marker_ttl))
                    .await
                {
                    warn!("idempotency marker write failed for {}: {}", marker, err);
                }
                self.queue.ack(&message.id).await?;
                Counters::incr(&counters().invalidations);
            }
            return Ok(settled);
        }

        for message in fresh {
            if message.attempts + 1 >= self.max_retries {
                warn!(
                    "dead-lettering invalidation {} after {} attempts",
                    message.id,
                    message.attempts + 1
                );
                Counters::incr(&counters().dead_letters);
                self.queue.dead_letter(message).await?;
            } else {
                let delay = self.backoff.delay(message.attempts as u64);
                Counters::incr(&counters().invalidation_retries);
                self.queue.retry(message, delay).await?;
            }
        }
        Ok(0)
    }
}
