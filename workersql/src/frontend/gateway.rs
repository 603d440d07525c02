//! The gateway facade: perimeter auth, classification, tenant
//! isolation and dispatch into the consistency engine, under one
//! end-to-end deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use workersql_config::Config;

use super::batch::{BatchLayer, BatchOutcome, BatchRequest};
use super::classifier::{classify_cached, Hint, StatementKind};
use super::error::Error;
use super::isolation;
use super::response::QueryResponse;
use super::transaction::Sessions;
use crate::auth::{ApiTokens, Principal};
use crate::backend::{Param, Statement};
use crate::engine::{Consistency, Engine, ReadRequest, WriteRequest};
use crate::util::{millis, Deadline};

/// Wire-level consistency hints; explicit hints override an inline
/// comment directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireConsistency {
    Strong,
    Bounded,
    Cached,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hints {
    pub consistency: Option<WireConsistency>,
    #[serde(rename = "boundedMs")]
    pub bounded_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

pub struct Gateway {
    engine: Arc<Engine>,
    batch: BatchLayer,
    sessions: Sessions,
    tokens: ApiTokens,
    strict_isolation: bool,
    query_timeout: Duration,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(engine: Arc<Engine>, config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            batch: BatchLayer::new(
                engine.cache().kv(),
                &config.limits,
                config.general.strict_isolation,
            ),
            sessions: Sessions::new(),
            tokens: ApiTokens::from_config(&config.auth),
            strict_isolation: config.general.strict_isolation,
            query_timeout: Duration::from_millis(config.general.query_timeout),
            engine,
            shutdown,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn authorize_token(&self, token: &str) -> Result<(), Error> {
        if self.tokens.authorize(token) {
            Ok(())
        } else {
            Err(Error::Auth)
        }
    }

    /// Auth errors reject at the perimeter, before the classifier.
    fn check_principal(principal: &Principal) -> Result<(), Error> {
        if principal.tenant_id.as_str().is_empty() {
            return Err(Error::Auth);
        }
        Ok(())
    }

    /// Execute one statement: reads route through the consistency
    /// engine, mutations and DDL through the write path. A statement
    /// carrying a transaction id sticks to its session's shard.
    pub async fn query(
        &self,
        principal: &Principal,
        sql: &str,
        params: Vec<Param>,
        hints: Option<Hints>,
        transaction_id: Option<&str>,
    ) -> Result<QueryResponse, Error> {
        Self::check_principal(principal)?;
        let started = Instant::now();
        let deadline = Deadline::after(self.query_timeout);
        let token = self.shutdown.child_token();

        let classification = classify_cached(sql);
        if classification.kind == StatementKind::Other {
            return Err(Error::InvalidQuery(format!(
                "statement could not be classified: \"{}\"",
                sql
            )));
        }

        if let Err(err) = super::query_logger::QueryLogger::new(&principal.tenant_id, sql)
            .log()
            .await
        {
            tracing::warn!("query log write failed: {}", err);
        }

        // Shards never see the hint directive, and hinted variants of
        // a statement share one cache fingerprint.
        let stripped = super::classifier::hint::strip(sql);
        let rewritten = isolation::rewrite(
            stripped,
            &classification,
            &principal.tenant_id,
            self.strict_isolation,
        )?;
        let statement = Statement::with_params(rewritten, params);
        let writes = classification.is_mutation || classification.kind == StatementKind::Ddl;

        if let Some(transaction_id) = transaction_id {
            let binding = self
                .sessions
                .get(transaction_id)
                .ok_or_else(|| Error::UnknownTransaction(transaction_id.to_string()))?;
            if binding.tenant != principal.tenant_id {
                return Err(Error::Permission(
                    "transaction belongs to another tenant".into(),
                ));
            }

            let result = self
                .engine
                .execute_pinned(
                    &binding.shard,
                    &principal.tenant_id,
                    classification.table.as_deref(),
                    &statement,
                    writes,
                    deadline,
                    &token,
                )
                .await?;
            return Ok(QueryResponse::from_execute(
                result,
                binding.shard,
                millis(started.elapsed()),
            ));
        }

        if writes {
            let outcome = self
                .engine
                .write(
                    WriteRequest {
                        tenant: principal.tenant_id.clone(),
                        table: classification.table.clone(),
                        statement,
                        deadline,
                    },
                    &token,
                )
                .await?;
            return Ok(QueryResponse::from_execute(
                outcome.result,
                outcome.shard,
                millis(started.elapsed()),
            ));
        }

        let outcome = self
            .engine
            .read(
                ReadRequest {
                    tenant: principal.tenant_id.clone(),
                    table: classification.table.clone().unwrap_or_default(),
                    statement,
                    consistency: resolve_consistency(hints, classification.hint),
                    deadline,
                },
                &token,
            )
            .await?;
        Ok(QueryResponse::from_read(outcome, millis(started.elapsed())))
    }

    /// The mutation endpoint admits only INSERT, UPDATE and DELETE.
    pub async fn mutation(
        &self,
        principal: &Principal,
        sql: &str,
        params: Vec<Param>,
        transaction_id: Option<&str>,
    ) -> Result<QueryResponse, Error> {
        let classification = classify_cached(sql);
        if !classification.is_mutation {
            return Err(Error::InvalidQuery(
                "endpoint accepts mutations only".into(),
            ));
        }
        self.query(principal, sql, params, None, transaction_id).await
    }

    /// The DDL endpoint admits only schema statements.
    pub async fn ddl(
        &self,
        principal: &Principal,
        sql: &str,
        params: Vec<Param>,
    ) -> Result<QueryResponse, Error> {
        let classification = classify_cached(sql);
        if classification.kind != StatementKind::Ddl {
            return Err(Error::InvalidQuery("endpoint accepts DDL only".into()));
        }
        self.query(principal, sql, params, None, None).await
    }

    pub async fn batch(
        &self,
        principal: &Principal,
        request: BatchRequest,
        idempotency_key: Option<&str>,
    ) -> Result<BatchOutcome, Error> {
        Self::check_principal(principal)?;
        let deadline = Deadline::after(self.query_timeout);
        let token = self.shutdown.child_token();
        self.batch
            .execute(
                &self.engine,
                &principal.tenant_id,
                request,
                idempotency_key,
                deadline,
                &token,
            )
            .await
    }

    /// Non-WebSocket transactional flow: BEGIN binds the session to
    /// the tenant's shard; COMMIT and ROLLBACK release it.
    pub async fn transaction(
        &self,
        principal: &Principal,
        op: TransactionOp,
        transaction_id: Option<&str>,
    ) -> Result<String, Error> {
        Self::check_principal(principal)?;
        let deadline = Deadline::after(self.query_timeout);
        let token = self.shutdown.child_token();

        match op {
            TransactionOp::Begin => {
                let route = self
                    .engine
                    .policy()
                    .active()
                    .await?
                    .resolve(&principal.tenant_id)?;
                let shard = route.primary().clone();
                self.engine
                    .client()
                    .execute(&shard, &Statement::new("BEGIN"), deadline, &token)
                    .await?;
                Ok(self.sessions.begin(principal.tenant_id.clone(), shard))
            }
            TransactionOp::Commit | TransactionOp::Rollback => {
                let transaction_id = transaction_id
                    .ok_or_else(|| Error::InvalidQuery("transactionId required".into()))?;
                let binding = self
                    .sessions
                    .get(transaction_id)
                    .ok_or_else(|| Error::UnknownTransaction(transaction_id.to_string()))?;
                if binding.tenant != principal.tenant_id {
                    return Err(Error::Permission(
                        "transaction belongs to another tenant".into(),
                    ));
                }

                let statement = match op {
                    TransactionOp::Commit => Statement::new("COMMIT"),
                    _ => Statement::new("ROLLBACK"),
                };
                let result = self
                    .engine
                    .client()
                    .execute(&binding.shard, &statement, deadline, &token)
                    .await;
                // The binding is gone either way; a dead shard must not
                // pin the session forever.
                self.sessions.release(transaction_id);
                result?;
                Ok(transaction_id.to_string())
            }
        }
    }
}

fn resolve_consistency(hints: Option<Hints>, inline: Hint) -> Consistency {
    if let Some(hints) = hints {
        if let Some(consistency) = hints.consistency {
            return match consistency {
                WireConsistency::Strong => Consistency::Strong,
                WireConsistency::Bounded => Consistency::Bounded {
                    max_stale_ms: hints.bounded_ms,
                },
                WireConsistency::Cached => Consistency::Cached,
            };
        }
    }

    match inline {
        Hint::Strong => Consistency::Strong,
        Hint::Bounded(max_stale_ms) => Consistency::Bounded { max_stale_ms },
        Hint::Cached => Consistency::Cached,
        // Absent hints resolve to bounded.
        Hint::Default => Consistency::Bounded { max_stale_ms: None },
    }
}
