//! SPLIT commands: plan creation and lifecycle triggers. Long-running
//! phases run one default budget segment per invocation; operators
//! re-invoke to continue, and progress is persisted between calls.

use std::collections::BTreeSet;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::prelude::*;
use crate::backend::ShardId;
use crate::routing::TenantId;
use crate::split::{Budget, SplitPlan};

pub struct Split {
    action: Action,
}

enum Action {
    Create {
        source: ShardId,
        target: ShardId,
        tenants: BTreeSet<TenantId>,
    },
    DualWrite { id: String },
    Backfill { id: String },
    Tail { id: String },
    Cutover { id: String },
    Rollback { id: String },
}

fn plan_row(plan: &SplitPlan, detail: serde_json::Value) -> Row {
    named_row(&[
        ("id", json!(plan.id)),
        ("phase", json!(plan.phase.to_string())),
        ("detail", detail),
    ])
}

#[async_trait]
impl Command for Split {
    fn name(&self) -> String {
        "SPLIT".into()
    }

    fn parse(sql: &str) -> Result<Self, Error> {
        let sql = sql.to_lowercase();
        let parts = sql.split_whitespace().collect::<Vec<_>>();

        let action = match parts[..] {
            ["split", "create", source, target, tenants] => Action::Create {
                source: ShardId::from(source),
                target: ShardId::from(target),
                tenants: tenants
                    .split(',')
                    .filter(|tenant| !tenant.is_empty())
                    .map(TenantId::from)
                    .collect(),
            },
            ["split", "dual_write", id] => Action::DualWrite { id: id.to_owned() },
            ["split", "backfill", id] => Action::Backfill { id: id.to_owned() },
            ["split", "tail", id] => Action::Tail { id: id.to_owned() },
            ["split", "cutover", id] => Action::Cutover { id: id.to_owned() },
            ["split", "rollback", id] => Action::Rollback { id: id.to_owned() },
            _ => return Err(Error::Syntax),
        };

        Ok(Self { action })
    }

    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        let token = CancellationToken::new();
        let controller = &context.controller;

        let row = match &self.action {
            Action::Create {
                source,
                target,
                tenants,
            } => {
                info!(
                    "creating split plan {} -> {} for {} tenants",
                    source,
                    target,
                    tenants.len()
                );
                let plan = controller
                    .create_plan(source.clone(), target.clone(), tenants.clone(), &token)
                    .await?;
                plan_row(&plan, json!("created"))
            }
            Action::DualWrite { id } => {
                let plan = controller.start_dual_write(id).await?;
                plan_row(&plan, json!("dual-write active"))
            }
            Action::Backfill { id } => {
                let (plan, outcome) = controller
                    .run_backfill(id, Budget::default(), &token)
                    .await?;
                plan_row(
                    &plan,
                    json!({
                        "completed": outcome.completed,
                        "rows_copied": outcome.rows_copied,
                    }),
                )
            }
            Action::Tail { id } => {
                let (plan, outcome) = controller
                    .replay_tail(id, Budget::default(), &token)
                    .await?;
                plan_row(
                    &plan,
                    json!({
                        "caught_up": outcome.caught_up,
                        "events_applied": outcome.events_applied,
                    }),
                )
            }
            Action::Cutover { id } => {
                let plan = controller.cutover(id).await?;
                plan_row(&plan, json!({ "routing_version": plan.routing_version_cutover }))
            }
            Action::Rollback { id } => {
                let plan = controller.rollback(id).await?;
                plan_row(&plan, json!({ "routing_version": plan.rollback_version }))
            }
        };

        Ok(vec![row])
    }
}
