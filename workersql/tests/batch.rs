//! Batch clamps and idempotent replay.

mod common;

use workersql::backend::{ShardTransport, Statement};
use workersql::frontend::{BatchRequest, Error};

use common::{harness, principal, test_config};

fn batch(statements: Vec<Statement>, transaction: bool) -> BatchRequest {
    BatchRequest {
        statements,
        transaction,
        stop_on_error: true,
    }
}

#[tokio::test]
async fn test_empty_batch_succeeds() {
    let h = harness(test_config()).await;
    let outcome = h
        .gateway
        .batch(&principal("t1"), batch(vec![], false), None)
        .await
        .unwrap();
    assert_eq!(outcome.response.total_rows_affected, 0);
    assert!(outcome.response.results.is_empty());
    assert!(!outcome.replayed);
}

#[tokio::test]
async fn test_max_ops_clamp() {
    let mut config = test_config();
    config.limits.max_ops = 2;
    let h = harness(config).await;

    let statements = (0..3)
        .map(|i| Statement::new(format!("INSERT INTO t (id) VALUES ({})", i)))
        .collect();
    let result = h
        .gateway
        .batch(&principal("t1"), batch(statements, false), None)
        .await;

    match result {
        Err(err @ Error::TooManyOps(2)) => {
            assert_eq!(err.envelope().http_status(), 413);
        }
        other => panic!("expected TooManyOps, got {:?}", other.map(|o| o.response)),
    }
    // No side effects.
    assert!(h.shard_a.events(0, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_max_bytes_clamp_is_413() {
    let mut config = test_config();
    config.limits.max_bytes = 32;
    let h = harness(config).await;

    let statements = vec![Statement::new(format!(
        "INSERT INTO t (name) VALUES ('{}')",
        "x".repeat(64)
    ))];
    let result = h
        .gateway
        .batch(&principal("t1"), batch(statements, false), None)
        .await;

    match result {
        Err(err @ Error::PayloadTooLarge(32)) => {
            assert_eq!(err.envelope().http_status(), 413);
        }
        other => panic!("expected PayloadTooLarge, got {:?}", other.map(|o| o.response)),
    }
    assert!(h.shard_a.events(0, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_mutation_rejected() {
    let h = harness(test_config()).await;
    let statements = vec![
        Statement::new("INSERT INTO t (id) VALUES (1)"),
        Statement::new("SELECT * FROM t"),
    ];
    let result = h
        .gateway
        .batch(&principal("t1"), batch(statements, false), None)
        .await;
    assert!(matches!(result, Err(Error::InvalidQuery(_))));
    // Validation runs before any statement executes.
    assert!(h.shard_a.events(0, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_idempotent_replay_is_byte_identical() {
    let h = harness(test_config()).await;
    let p = principal("t1");
    let request = batch(
        vec![Statement::new(
            "INSERT INTO users (id, name) VALUES (1, 'John')",
        )],
        false,
    );

    let first = h
        .gateway
        .batch(&p, request.clone(), Some("op-42"))
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.response.total_rows_affected, 1);

    let second = h
        .gateway
        .batch(&p, request.clone(), Some("op-42"))
        .await
        .unwrap();
    assert!(second.replayed);
    assert_eq!(first.raw, second.raw, "replay is byte-identical");
    assert_eq!(first.response, second.response);

    // The shard executed exactly once.
    assert_eq!(h.shard_a.events(0, 100).await.unwrap().len(), 1);

    // A different key executes again.
    let third = h
        .gateway
        .batch(&p, request, Some("op-43"))
        .await
        .unwrap();
    assert!(!third.replayed);
    assert_eq!(h.shard_a.events(0, 100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_statements_are_tenant_scoped() {
    let h = harness(test_config()).await;

    // The INSERT carries no tenant column; the rewrite adds it before
    // the statement reaches the shard.
    h.gateway
        .batch(
            &principal("t1"),
            batch(
                vec![Statement::new("INSERT INTO users (id, name) VALUES (1, 'a')")],
                false,
            ),
            None,
        )
        .await
        .unwrap();

    let rows = h
        .shard_a
        .export("users", &"t1".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0]["tenant_id"], "t1");

    // Another tenant's unqualified DELETE is scoped to its own rows
    // and cannot touch t1's data.
    h.gateway
        .batch(
            &principal("t2"),
            batch(vec![Statement::new("DELETE FROM users")], false),
            None,
        )
        .await
        .unwrap();

    let rows = h
        .shard_a
        .export("users", &"t1".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1, "t2's DELETE must not touch t1 rows");
}

#[tokio::test]
async fn test_strict_isolation_applies_to_batches() {
    let mut config = test_config();
    config.general.strict_isolation = true;
    let h = harness(config).await;

    let result = h
        .gateway
        .batch(
            &principal("t1"),
            batch(vec![Statement::new("INSERT INTO users VALUES (1, 'a')")], false),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidQuery(_))));
    assert!(h.shard_a.events(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_keys_are_tenant_scoped() {
    let h = harness(test_config()).await;
    let request = batch(
        vec![Statement::new("INSERT INTO users (id) VALUES (1)")],
        false,
    );

    h.gateway
        .batch(&principal("t1"), request.clone(), Some("op-1"))
        .await
        .unwrap();
    // Same key, different tenant: a fresh execution.
    let other = h
        .gateway
        .batch(&principal("t2"), request, Some("op-1"))
        .await
        .unwrap();
    assert!(!other.replayed);
    assert_eq!(h.shard_a.events(0, 100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_per_item_errors_without_stop_on_error() {
    let h = harness(test_config()).await;
    let p = principal("t1");

    // The middle statement fails on the shard: its column list does
    // not match the value tuple.
    let request = BatchRequest {
        statements: vec![
            Statement::new("INSERT INTO users (id, name) VALUES (1, 'a')"),
            Statement::new("INSERT INTO users (id) VALUES (2, 'extra')"),
            Statement::new("INSERT INTO users (id, name) VALUES (3, 'c')"),
        ],
        transaction: false,
        stop_on_error: false,
    };

    let outcome = h.gateway.batch(&p, request, None).await.unwrap();
    assert_eq!(outcome.response.results.len(), 3);
    assert!(outcome.response.results[0].success);
    assert!(!outcome.response.results[1].success);
    assert!(outcome.response.results[1].error.is_some());
    assert!(outcome.response.results[2].success);
    assert_eq!(outcome.response.total_rows_affected, 2);
}

#[tokio::test]
async fn test_stop_on_error_halts_batch() {
    let h = harness(test_config()).await;
    let p = principal("t1");

    let request = BatchRequest {
        statements: vec![
            Statement::new("INSERT INTO users (id) VALUES (1, 'extra')"),
            Statement::new("INSERT INTO users (id, name) VALUES (2, 'b')"),
        ],
        transaction: false,
        stop_on_error: true,
    };

    let outcome = h.gateway.batch(&p, request, None).await.unwrap();
    assert_eq!(outcome.response.results.len(), 1);
    assert!(!outcome.response.results[0].success);
    // The second statement never ran.
    assert!(h.shard_a.events(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transactional_batch_atomic_on_actor() {
    let h = harness(test_config()).await;
    let p = principal("t1");

    let outcome = h
        .gateway
        .batch(
            &p,
            batch(
                vec![
                    Statement::new("INSERT INTO users (id, name) VALUES (1, 'a')"),
                    Statement::new("INSERT INTO orders (id, total) VALUES (1, 10)"),
                ],
                true,
            ),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.response.total_rows_affected, 2);
    assert!(outcome.response.results.iter().all(|item| item.success));

    // One unioned invalidation event covers both tables.
    assert_eq!(h.queue.depth(), 1);
    let settled = h.consumer.process_batch().await.unwrap();
    assert_eq!(settled, 1);
}
