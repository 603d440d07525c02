//! Online shard-split lifecycle over the memory backends.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use workersql::backend::ShardTransport;
use workersql::routing::{PolicyStore, TenantId, TenantRoute};
use workersql::split::{Budget, Error, Phase, SplitController};

use common::{harness, principal, test_config, Harness};

fn controller(h: &Harness) -> SplitController {
    let policy: Arc<dyn PolicyStore> = h.policy.clone();
    SplitController::new(h.kv.clone(), policy, h.client.clone(), &h.config)
}

fn tenants(names: &[&str]) -> BTreeSet<TenantId> {
    names.iter().map(|name| TenantId::from(*name)).collect()
}

async fn seed_rows(h: &Harness, tenant: &str, count: usize) {
    let p = principal(tenant);
    for i in 1..=count {
        h.gateway
            .query(
                &p,
                &format!("INSERT INTO users (id, name) VALUES ({}, 'row-{}')", i, i),
                vec![],
                None,
                None,
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_split_happy_path() {
    let h = harness(test_config()).await;
    let p = principal("alpha");
    let token = CancellationToken::new();
    let controller = controller(&h);

    seed_rows(&h, "alpha", 2).await;

    let plan = controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha"]), &token)
        .await
        .unwrap();
    assert_eq!(plan.phase, Phase::Planning);
    assert_eq!(plan.routing_version_at_start, 1);

    // Dual-write: new writes land on the source and mirror to the
    // target synchronously.
    let plan = controller.start_dual_write(&plan.id).await.unwrap();
    assert_eq!(plan.phase, Phase::DualWrite);

    h.gateway
        .query(&p, "INSERT INTO users (id, name) VALUES (3, 'row-3')", vec![], None, None)
        .await
        .unwrap();
    let mirrored = h
        .shard_b
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(mirrored.rows.len(), 1);
    assert_eq!(mirrored.rows[0]["id"], 3);

    // Backfill copies the historical rows; dual-written rows upsert
    // idempotently.
    let (plan, outcome) = controller
        .run_backfill(&plan.id, Budget::default(), &token)
        .await
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(plan.phase, Phase::Tailing);
    assert!(plan.backfill.total_rows_copied >= 2);

    let copied = h
        .shard_b
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(copied.rows.len(), 3);

    // Post-cursor activity: one mutation, one DDL.
    h.gateway
        .query(&p, "INSERT INTO users (id, name) VALUES (4, 'row-4')", vec![], None, None)
        .await
        .unwrap();
    h.gateway
        .ddl(&p, "CREATE TABLE IF NOT EXISTS alpha_notes (id BIGINT)", vec![])
        .await
        .unwrap();

    let (plan, tail) = controller
        .replay_tail(&plan.id, Budget::default(), &token)
        .await
        .unwrap();
    assert!(tail.caught_up);
    assert_eq!(plan.phase, Phase::CutoverPending);
    assert!(plan.tail.last_event_id > 0);

    let replayed = h
        .shard_b
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(replayed.rows.len(), 4);
    assert!(h
        .shard_b
        .tables()
        .await
        .unwrap()
        .contains(&"alpha_notes".to_string()));

    // Cutover: the one routing-visible publish.
    let plan = controller.cutover(&plan.id).await.unwrap();
    assert_eq!(plan.phase, Phase::Completed);
    let cutover_version = plan.routing_version_cutover.unwrap();
    assert!(cutover_version > plan.routing_version_at_start);

    let active = h.policy.active().await.unwrap();
    assert_eq!(active.version, cutover_version);
    assert_eq!(
        active.resolve(&"alpha".into()).unwrap(),
        TenantRoute::single("shard-b")
    );

    // Reads and writes now route to the target.
    let read = h
        .gateway
        .query(&p, "/*+ strong */ SELECT * FROM users", vec![], None, None)
        .await
        .unwrap();
    assert_eq!(read.metadata.shard_id, "shard-b".into());
    assert_eq!(read.data.len(), 4);

    let before = h.shard_a.events(0, 1_000).await.unwrap().len();
    h.gateway
        .query(&p, "INSERT INTO users (id, name) VALUES (5, 'row-5')", vec![], None, None)
        .await
        .unwrap();
    assert_eq!(
        h.shard_a.events(0, 1_000).await.unwrap().len(),
        before,
        "no new writes reach the source after cutover"
    );
    let target = h
        .shard_b
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(target.rows.len(), 5);
}

#[tokio::test]
async fn test_split_rollback_during_tailing() {
    let h = harness(test_config()).await;
    let p = principal("alpha");
    let token = CancellationToken::new();
    let controller = controller(&h);

    seed_rows(&h, "alpha", 2).await;

    let plan = controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha"]), &token)
        .await
        .unwrap();
    controller.start_dual_write(&plan.id).await.unwrap();
    let (plan, outcome) = controller
        .run_backfill(&plan.id, Budget::default(), &token)
        .await
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(plan.phase, Phase::Tailing);

    let plan = controller.rollback(&plan.id).await.unwrap();
    assert_eq!(plan.phase, Phase::RolledBack);
    assert!(plan.rollback_version.is_some());

    // Tenants are exclusively on the source again, dual-write off.
    let active = h.policy.active().await.unwrap();
    assert_eq!(
        active.resolve(&"alpha".into()).unwrap(),
        TenantRoute::single("shard-a")
    );

    let target_before = h
        .shard_b
        .export("users", &"alpha".into(), None, 100)
        .await
        .unwrap()
        .rows
        .len();
    h.gateway
        .query(&p, "INSERT INTO users (id, name) VALUES (9, 'after')", vec![], None, None)
        .await
        .unwrap();
    let target_after = h
        .shard_b
        .export("users", &"alpha".into(), None, 100)
        .await
        .unwrap()
        .rows
        .len();
    assert_eq!(target_before, target_after, "no mirroring after rollback");

    let read = h
        .gateway
        .query(&p, "/*+ strong */ SELECT * FROM users", vec![], None, None)
        .await
        .unwrap();
    assert_eq!(read.metadata.shard_id, "shard-a".into());

    // Terminal: the plan cannot be resumed.
    assert!(matches!(
        controller.start_dual_write(&plan.id).await,
        Err(Error::InvalidTransition(_, _))
    ));
}

#[tokio::test]
async fn test_mirror_failure_does_not_abort_source_write() {
    let h = harness(test_config()).await;
    let p = principal("alpha");

    // Dual-write against a target that is not reachable.
    let next = h.policy.active().await.unwrap().with_route(
        "alpha".into(),
        workersql::routing::TenantRoute::dual_write("shard-a", vec!["ghost".into()]),
    );
    h.policy.publish(next).await.unwrap();

    let response = h
        .gateway
        .query(&p, "INSERT INTO users (id, name) VALUES (1, 'a')", vec![], None, None)
        .await
        .unwrap();
    assert!(response.success, "source write commits despite mirror failure");

    let rows = h
        .shard_a
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1);
}

#[tokio::test]
async fn test_tenant_in_one_plan_at_a_time() {
    let h = harness(test_config()).await;
    let token = CancellationToken::new();
    let controller = controller(&h);

    controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha"]), &token)
        .await
        .unwrap();

    let second = controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha", "beta"]), &token)
        .await;
    assert!(matches!(second, Err(Error::TenantBusy(_))));
}

#[tokio::test]
async fn test_target_must_be_empty() {
    let h = harness(test_config()).await;
    let token = CancellationToken::new();
    let controller = controller(&h);

    seed_rows(&h, "alpha", 1).await;

    // Pre-existing tenant rows on the target fail the plan.
    let page = h
        .shard_a
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    h.shard_b.import("users", &page.rows).await.unwrap();

    let result = controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha"]), &token)
        .await;
    assert!(matches!(result, Err(Error::TargetNotEmpty(_, _))));
}

#[tokio::test]
async fn test_backfill_budget_resumable() {
    let h = harness(test_config()).await;
    let token = CancellationToken::new();
    let controller = controller(&h);

    seed_rows(&h, "alpha", 5).await;

    let plan = controller
        .create_plan("shard-a".into(), "shard-b".into(), tenants(&["alpha"]), &token)
        .await
        .unwrap();
    controller.start_dual_write(&plan.id).await.unwrap();

    // Tight row budget: the segment stops early with progress saved.
    let (plan, first) = controller
        .run_backfill(
            &plan.id,
            Budget {
                max_rows: 2,
                max_duration: Duration::from_secs(10),
                batch_size: 2,
            },
            &token,
        )
        .await
        .unwrap();
    assert!(!first.completed);
    assert_eq!(plan.phase, Phase::Backfill);
    assert!(plan.backfill.total_rows_copied >= 2);

    // Re-invoking resumes from the persisted cursor and finishes.
    let (plan, second) = controller
        .run_backfill(&plan.id, Budget::default(), &token)
        .await
        .unwrap();
    assert!(second.completed);
    assert_eq!(plan.phase, Phase::Tailing);
    assert_eq!(plan.backfill.total_rows_copied, 5);

    let copied = h
        .shard_b
        .export("users", &"alpha".into(), None, 100)
        .await
        .unwrap();
    assert_eq!(copied.rows.len(), 5);
}
