//! Write path. Writes always bypass the cache and execute on the
//! owning shard; cache cleanup happens through the invalidation bus so
//! every gateway instance converges on the same state.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Engine, Error, WriteOutcome, WriteRequest};
use crate::backend::{ExecuteResult, ShardId, Statement};
use crate::queue::Event;
use crate::routing::TenantId;
use crate::stats::{counters, Counters};
use crate::util::Deadline;

impl Engine {
    pub async fn write(
        &self,
        request: WriteRequest,
        token: &CancellationToken,
    ) -> Result<WriteOutcome, Error> {
        let route = self.policy.active().await?.resolve(&request.tenant)?;

        // Source first. A failure here aborts the write.
        let result = self
            .client
            .execute(route.primary(), &request.statement, request.deadline, token)
            .await?;
        Counters::incr(&counters().shard_writes);

        // Mirror the same statement text and params to each dual-write
        // target, synchronously. Mirror failures do not abort the
        // committed source write; tail replay compensates.
        for mirror in route.mirrors() {
            if let Err(err) = self
                .client
                .execute(mirror, &request.statement, request.deadline, token)
                .await
            {
                warn!(
                    "dual-write mirror to \"{}\" failed for tenant \"{}\": {}",
                    mirror, request.tenant, err
                );
                Counters::incr(&counters().mirror_errors);
            }
        }

        self.emit_invalidation(&request.tenant, request.table.as_deref())
            .await;

        Ok(WriteOutcome {
            result,
            shard: route.primary().clone(),
        })
    }

    /// Execute a mutation on an explicitly pinned shard (sticky
    /// transaction binding), with the usual invalidation emit.
    pub async fn execute_pinned(
        &self,
        shard: &ShardId,
        tenant: &TenantId,
        table: Option<&str>,
        statement: &Statement,
        is_mutation: bool,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<ExecuteResult, Error> {
        let result = self
            .client
            .execute(shard, statement, deadline, token)
            .await?;
        if is_mutation {
            Counters::incr(&counters().shard_writes);
            self.emit_invalidation(tenant, table).await;
        }
        Ok(result)
    }

    /// Emit the invalidation after the shard acknowledged. Enqueue
    /// failures are not client-visible: entry TTLs still bound
    /// staleness.
    pub(crate) async fn emit_invalidation(&self, tenant: &TenantId, table: Option<&str>) {
        if let Some(table) = table {
            let event = Event::invalidate(tenant.clone(), vec![table.to_string()]);
            if let Err(err) = self.queue.send(event).await {
                warn!(
                    "invalidation enqueue failed for tenant \"{}\" table \"{}\": {}",
                    tenant, table, err
                );
            }
        }
    }

    /// Execute an ordered statement batch. Atomic batches run as one
    /// actor call on the tenant's primary (mirrored to dual-write
    /// targets) and emit a single invalidation covering every table;
    /// non-atomic batches run statement by statement.
    pub async fn write_batch(
        &self,
        tenant: &TenantId,
        statements: &[(Statement, Option<String>)],
        atomic: bool,
        stop_on_error: bool,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<Vec<Result<ExecuteResult, Error>>, Error> {
        let route = self.policy.active().await?.resolve(tenant)?;

        if atomic {
            let stmts = statements
                .iter()
                .map(|(stmt, _)| stmt.clone())
                .collect::<Vec<_>>();
            let results = self
                .client
                .execute_batch(route.primary(), &stmts, deadline, token)
                .await?;
            Counters::incr(&counters().shard_writes);

            for mirror in route.mirrors() {
                if let Err(err) = self
                    .client
                    .execute_batch(mirror, &stmts, deadline, token)
                    .await
                {
                    warn!("dual-write batch mirror to \"{}\" failed: {}", mirror, err);
                    Counters::incr(&counters().mirror_errors);
                }
            }

            let mut tables = statements
                .iter()
                .filter_map(|(_, table)| table.clone())
                .collect::<Vec<_>>();
            tables.sort();
            tables.dedup();
            if !tables.is_empty() {
                let event = Event::invalidate(tenant.clone(), tables);
                if let Err(err) = self.queue.send(event).await {
                    warn!("invalidation enqueue failed for batch: {}", err);
                }
            }

            return Ok(results.into_iter().map(Ok).collect());
        }

        let mut results = vec![];
        for (statement, table) in statements {
            let outcome = self
                .write(
                    WriteRequest {
                        tenant: tenant.clone(),
                        table: table.clone(),
                        statement: statement.clone(),
                        deadline,
                    },
                    token,
                )
                .await;
            let failed = outcome.is_err();
            results.push(outcome.map(|o| o.result));
            if failed && stop_on_error {
                break;
            }
        }
        Ok(results)
    }
}
