//! SHOW SPLITS command.

use serde_json::json;

use super::prelude::*;

pub struct ShowSplits;

#[async_trait]
impl Command for ShowSplits {
    fn name(&self) -> String {
        "SHOW SPLITS".into()
    }

    fn parse(_sql: &str) -> Result<Self, Error> {
        Ok(Self)
    }

    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        let mut plans = context.controller.store().list().await?;
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(plans
            .into_iter()
            .map(|plan| {
                named_row(&[
                    ("id", json!(plan.id)),
                    ("source", json!(plan.source)),
                    ("target", json!(plan.target)),
                    ("tenants", json!(plan.tenants)),
                    ("phase", json!(plan.phase.to_string())),
                    ("rows_copied", json!(plan.backfill.total_rows_copied)),
                    ("last_event_id", json!(plan.tail.last_event_id)),
                    ("routing_version_at_start", json!(plan.routing_version_at_start)),
                    ("routing_version_cutover", json!(plan.routing_version_cutover)),
                    ("rollback_version", json!(plan.rollback_version)),
                    ("error", json!(plan.error_message)),
                ])
            })
            .collect())
    }
}
