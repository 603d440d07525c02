use async_trait::async_trait;

use super::{ExecuteResult, ExportPage, MutationEvent, Row, Statement};
use crate::backend::Error;
use crate::routing::TenantId;

/// RPC surface of a shard actor. Implementations must preserve the
/// single-writer contract: mutations commit in a total order with
/// ascending versions, and `import` is an idempotent upsert keyed
/// by primary key.
#[async_trait]
pub trait ShardTransport: Send + Sync {
    async fn execute(&self, stmt: &Statement) -> Result<ExecuteResult, Error>;

    /// Execute all statements atomically on the actor.
    async fn execute_batch(&self, stmts: &[Statement]) -> Result<Vec<ExecuteResult>, Error>;

    async fn export(
        &self,
        table: &str,
        tenant: &TenantId,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<ExportPage, Error>;

    async fn import(&self, table: &str, rows: &[Row]) -> Result<u64, Error>;

    /// Mutation log page after `after_id`, oldest first.
    async fn events(&self, after_id: i64, limit: usize) -> Result<Vec<MutationEvent>, Error>;

    /// Tables present in the shard's schema.
    async fn tables(&self) -> Result<Vec<String>, Error>;

    /// Replay one mutation event. Transports that distinguish
    /// mutation and DDL endpoints override this.
    async fn apply(&self, event: &MutationEvent) -> Result<ExecuteResult, Error> {
        self.execute(&Statement {
            sql: event.sql.clone(),
            params: event.params.clone(),
        })
        .await
    }
}
