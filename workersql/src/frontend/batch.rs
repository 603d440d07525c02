//! Multi-statement mutations with caller-supplied idempotency keys.
//! First successful execution records the serialized response; replays
//! with the same key return it byte-identical, and concurrent replays
//! of an in-flight key block until the first finishes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use workersql_config::Limits;

use super::classifier::{classify_cached, hint};
use super::error::Error;
use super::isolation;
use crate::backend::Statement;
use crate::cache::Kv;
use crate::engine::Engine;
use crate::routing::TenantId;
use crate::stats::{counters, Counters};
use crate::util::Deadline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub transaction: bool,
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub success: bool,
    #[serde(rename = "rowsAffected")]
    pub rows_affected: u64,
    #[serde(rename = "insertId", skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<u64>,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "totalRowsAffected")]
    pub total_rows_affected: u64,
    pub results: Vec<BatchItem>,
}

/// A batch result plus its canonical serialized form. `raw` is what
/// idempotent replays return, byte for byte.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub response: BatchResponse,
    pub raw: Bytes,
    pub replayed: bool,
}

pub struct BatchLayer {
    records: Arc<dyn Kv>,
    in_flight: DashMap<String, Arc<Notify>>,
    max_ops: usize,
    max_bytes: usize,
    record_ttl: Duration,
    strict_isolation: bool,
}

impl BatchLayer {
    pub fn new(records: Arc<dyn Kv>, limits: &Limits, strict_isolation: bool) -> Self {
        Self {
            records,
            in_flight: DashMap::new(),
            max_ops: limits.max_ops,
            max_bytes: limits.max_bytes,
            record_ttl: Duration::from_millis(limits.idempotency_ttl),
            strict_isolation,
        }
    }

    fn record_key(tenant: &TenantId, key: &str) -> String {
        format!("idem:batch:{}:{}", tenant, key)
    }

    /// Validate clamps and statement classes before any side effect.
    fn validate(&self, request: &BatchRequest) -> Result<(), Error> {
        if request.statements.len() > self.max_ops {
            return Err(Error::TooManyOps(self.max_ops));
        }

        let payload = request
            .statements
            .iter()
            .map(Statement::approx_size)
            .sum::<usize>();
        if payload > self.max_bytes {
            return Err(Error::PayloadTooLarge(self.max_bytes));
        }

        for statement in &request.statements {
            let classification = classify_cached(&statement.sql);
            if !classification.is_mutation {
                return Err(Error::InvalidQuery(format!(
                    "batch statements must be mutations: \"{}\"",
                    statement.sql
                )));
            }
        }

        Ok(())
    }

    pub async fn execute(
        &self,
        engine: &Engine,
        tenant: &TenantId,
        request: BatchRequest,
        idempotency_key: Option<&str>,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<BatchOutcome, Error> {
        self.validate(&request)?;

        let record_key = idempotency_key.map(|key| Self::record_key(tenant, key));

        // Replay or claim the in-flight slot.
        let notify = if let Some(record_key) = &record_key {
            loop {
                if let Some(outcome) = self.replay(record_key).await {
                    return Ok(outcome);
                }
                let waiter = {
                    match self.in_flight.entry(record_key.clone()) {
                        dashmap::mapref::entry::Entry::Vacant(vacant) => {
                            let notify = Arc::new(Notify::new());
                            vacant.insert(notify.clone());
                            break Some(notify);
                        }
                        dashmap::mapref::entry::Entry::Occupied(occupied) => {
                            occupied.get().clone()
                        }
                    }
                };
                // Another execution of this key is in flight; block
                // until it completes, then re-check the record. The
                // timeout covers a wake lost between the lookup and
                // registering the waiter.
                let _ = tokio::time::timeout(Duration::from_millis(100), waiter.notified()).await;
            }
        } else {
            None
        };

        let result = self.run(engine, tenant, &request, deadline, token).await;

        if let (Some(record_key), Some(notify)) = (&record_key, &notify) {
            if let Ok(outcome) = &result {
                if let Err(err) = self
                    .records
                    .put(record_key, outcome.raw.clone(), Some(self.record_ttl))
                    .await
                {
                    warn!("idempotency record write failed for {}: {}", record_key, err);
                }
            }
            self.in_flight.remove(record_key);
            notify.notify_waiters();
        }

        result
    }

    async fn replay(&self, record_key: &str) -> Option<BatchOutcome> {
        let raw = self.records.get(record_key).await.ok().flatten()?;
        let response = serde_json::from_slice(&raw).ok()?;
        Counters::incr(&counters().idempotent_replays);
        Some(BatchOutcome {
            response,
            raw,
            replayed: true,
        })
    }

    async fn run(
        &self,
        engine: &Engine,
        tenant: &TenantId,
        request: &BatchRequest,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<BatchOutcome, Error> {
        if request.statements.is_empty() {
            return Self::outcome(BatchResponse {
                total_rows_affected: 0,
                results: vec![],
            });
        }

        // Tenant-scope every statement before it reaches a shard, the
        // same rewrite the single-statement path applies.
        let statements = request
            .statements
            .iter()
            .map(|statement| {
                let classification = classify_cached(&statement.sql);
                let stripped = hint::strip(&statement.sql);
                let rewritten =
                    isolation::rewrite(stripped, &classification, tenant, self.strict_isolation)?;
                Ok((
                    Statement::with_params(rewritten, statement.params.clone()),
                    classification.table,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let results = engine
            .write_batch(
                tenant,
                &statements,
                request.transaction,
                request.stop_on_error,
                deadline,
                token,
            )
            .await?;

        let mut total = 0;
        let items = results
            .into_iter()
            .map(|result| match result {
                Ok(result) => {
                    total += result.rows_affected;
                    BatchItem {
                        success: true,
                        rows_affected: result.rows_affected,
                        insert_id: result.insert_id,
                        version: result.version,
                        error: None,
                    }
                }
                Err(err) => BatchItem {
                    success: false,
                    rows_affected: 0,
                    insert_id: None,
                    version: 0,
                    error: Some(err.to_string()),
                },
            })
            .collect();

        Self::outcome(BatchResponse {
            total_rows_affected: total,
            results: items,
        })
    }

    fn outcome(response: BatchResponse) -> Result<BatchOutcome, Error> {
        let raw = Bytes::from(serde_json::to_vec(&response)?);
        Ok(BatchOutcome {
            response,
            raw,
            replayed: false,
        })
    }
}
