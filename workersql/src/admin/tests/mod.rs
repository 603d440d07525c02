use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{AdminContext, Error, ParseResult};
use crate::backend::{Backoff, Breakers, MemoryShard, ShardClient, ShardTransport, Statement};
use crate::cache::{Cache, MemoryKv};
use crate::routing::{KvPolicyStore, PolicyStore, RangeRule, RoutingPolicy};
use crate::split::SplitController;
use workersql_config::Config;

async fn context() -> (AdminContext, MemoryShard, MemoryShard) {
    let kv = Arc::new(MemoryKv::new());
    let cache = Cache::new(kv.clone());

    let client = ShardClient::new(
        Breakers::new(Default::default()),
        Backoff::new(2, Duration::from_millis(1), Duration::from_millis(2)),
    );
    let shard_a = MemoryShard::new("shard-a");
    let shard_b = MemoryShard::new("shard-b");
    client.add_shard("shard-a".into(), Arc::new(shard_a.clone()));
    client.add_shard("shard-b".into(), Arc::new(shard_b.clone()));

    let policy = Arc::new(KvPolicyStore::new(kv.clone()));
    policy
        .ensure_active(RoutingPolicy::new(vec![RangeRule {
            prefix: "".into(),
            shard: "shard-a".into(),
        }]))
        .await
        .unwrap();

    let policy: Arc<dyn PolicyStore> = policy;
    let mut config = Config::default();
    config.general.tail_settle_interval = 20;
    let controller = Arc::new(SplitController::new(
        kv,
        policy.clone(),
        client.clone(),
        &config,
    ));

    (
        AdminContext {
            controller,
            policy,
            client,
            cache,
        },
        shard_a,
        shard_b,
    )
}

#[tokio::test]
async fn test_unknown_command() {
    assert!(matches!(
        ParseResult::parse("DROP EVERYTHING"),
        Err(Error::UnknownCommand)
    ));
    assert!(matches!(
        ParseResult::parse("split sideways"),
        Err(Error::Syntax)
    ));
}

#[tokio::test]
async fn test_show_version_and_stats() {
    let (context, _, _) = context().await;

    let rows = ParseResult::parse("SHOW VERSION")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["version"].as_str().unwrap().contains("WorkerSQL"));

    let rows = ParseResult::parse("SHOW STATS")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert!(rows.iter().any(|row| row["counter"] == "cache_hits"));
}

#[tokio::test]
async fn test_show_policy_and_breakers() {
    let (context, _, _) = context().await;

    let rows = ParseResult::parse("SHOW POLICY")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["mode"], "range");
    assert_eq!(rows[0]["shard"], "shard-a");

    // Breakers register on first use.
    let token = CancellationToken::new();
    let _ = context
        .client
        .execute(
            &"shard-a".into(),
            &Statement::new("SELECT 1"),
            crate::util::Deadline::after(Duration::from_secs(1)),
            &token,
        )
        .await;
    let rows = ParseResult::parse("SHOW BREAKERS")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert!(!rows.is_empty());
    assert_eq!(rows[0]["state"], "closed");
}

#[tokio::test]
async fn test_split_lifecycle_via_commands() {
    let (context, shard_a, shard_b) = context().await;

    shard_a
        .execute(&Statement::new(
            "INSERT INTO users (id, name, tenant_id) VALUES (1, 'a', 'alpha'), (2, 'b', 'alpha')",
        ))
        .await
        .unwrap();

    let rows = ParseResult::parse("SPLIT CREATE shard-a shard-b alpha")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    let id = rows[0]["id"].as_str().unwrap().to_string();
    assert_eq!(rows[0]["phase"], "planning");

    let rows = ParseResult::parse(&format!("SPLIT DUAL_WRITE {}", id))
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows[0]["phase"], "dual_write");

    let rows = ParseResult::parse(&format!("SPLIT BACKFILL {}", id))
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows[0]["phase"], "tailing");
    assert_eq!(rows[0]["detail"]["completed"], true);

    let rows = ParseResult::parse(&format!("SPLIT TAIL {}", id))
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows[0]["phase"], "cutover_pending");

    let rows = ParseResult::parse(&format!("SPLIT CUTOVER {}", id))
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows[0]["phase"], "completed");

    let page = shard_b
        .export("users", &"alpha".into(), None, 10)
        .await
        .unwrap();
    assert_eq!(page.rows.len(), 2);

    let rows = ParseResult::parse("SHOW SPLITS")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["phase"], "completed");
}

#[tokio::test]
async fn test_invalidate_command() {
    let (context, _, _) = context().await;

    let mut row = crate::backend::Row::new();
    row.insert("id".into(), 1.into());
    context
        .cache
        .put("t1:q:users:abc", &[row.clone()], 60_000, 0, &"shard-a".into(), 1)
        .await;
    context
        .cache
        .put("t1:e:users:1", &[row], 60_000, 0, &"shard-a".into(), 1)
        .await;

    let rows = ParseResult::parse("INVALIDATE t1 users")
        .unwrap()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(rows[0]["removed"], 2);
    assert!(matches!(
        context.cache.get("t1:q:users:abc").await,
        crate::cache::CacheStatus::Miss
    ));
}
