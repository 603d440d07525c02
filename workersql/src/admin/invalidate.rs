//! INVALIDATE command: clear a tenant's cached entries for one table,
//! bypassing the bus.

use serde_json::json;

use super::prelude::*;
use crate::cache::key;
use crate::routing::TenantId;

pub struct Invalidate {
    tenant: TenantId,
    table: String,
}

#[async_trait]
impl Command for Invalidate {
    fn name(&self) -> String {
        "INVALIDATE".into()
    }

    fn parse(sql: &str) -> Result<Self, Error> {
        let sql = sql.to_lowercase();
        let parts = sql.split_whitespace().collect::<Vec<_>>();

        match parts[..] {
            ["invalidate", tenant, table] => Ok(Self {
                tenant: TenantId::from(tenant),
                table: table.to_owned(),
            }),
            _ => Err(Error::Syntax),
        }
    }

    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        let mut removed = 0;
        for prefix in [
            key::query_prefix(&self.tenant, &self.table),
            key::entity_prefix(&self.tenant, &self.table),
        ] {
            removed += context.cache.invalidate_by_pattern(&prefix).await?;
        }

        Ok(vec![named_row(&[
            ("tenant", json!(self.tenant)),
            ("table", json!(self.table)),
            ("removed", json!(removed)),
        ])])
    }
}
