//! SHOW POLICY command.

use serde_json::json;

use super::prelude::*;
use crate::routing::TenantRoute;

pub struct ShowPolicy;

#[async_trait]
impl Command for ShowPolicy {
    fn name(&self) -> String {
        "SHOW POLICY".into()
    }

    fn parse(_sql: &str) -> Result<Self, Error> {
        Ok(Self)
    }

    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        let policy = context.policy.active().await?;
        let mut rows = vec![];

        for (tenant, route) in &policy.tenants {
            let (mode, shard, mirrors) = match route {
                TenantRoute::Single { shard } => ("single", shard.clone(), vec![]),
                TenantRoute::DualWrite { primary, mirrors } => {
                    ("dual_write", primary.clone(), mirrors.clone())
                }
            };
            rows.push(named_row(&[
                ("version", json!(policy.version)),
                ("tenant", json!(tenant)),
                ("mode", json!(mode)),
                ("shard", json!(shard)),
                ("mirrors", json!(mirrors)),
            ]));
        }

        for range in &policy.ranges {
            rows.push(named_row(&[
                ("version", json!(policy.version)),
                ("tenant", json!(format!("{}*", range.prefix))),
                ("mode", json!("range")),
                ("shard", json!(range.shard)),
                ("mirrors", json!([] as [&str; 0])),
            ]));
        }

        Ok(rows)
    }
}
