#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use workersql::auth::Principal;
use workersql::backend::{Backoff, Breakers, MemoryShard, ShardClient};
use workersql::cache::{key, Cache, MemoryKv};
use workersql::engine::Engine;
use workersql::frontend::classifier::{classify, hint};
use workersql::frontend::{isolation, Gateway};
use workersql::queue::{InvalidationConsumer, MemoryQueue, Queue};
use workersql::routing::{KvPolicyStore, PolicyStore, RangeRule, RoutingPolicy};
use workersql_config::Config;

pub struct Harness {
    pub gateway: Gateway,
    pub engine: Arc<Engine>,
    pub cache: Cache,
    pub kv: Arc<MemoryKv>,
    pub queue: Arc<MemoryQueue>,
    pub consumer: InvalidationConsumer,
    pub policy: Arc<KvPolicyStore>,
    pub client: ShardClient,
    pub shard_a: MemoryShard,
    pub shard_b: MemoryShard,
    pub config: Config,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.query_timeout = 5_000;
    config.general.tail_settle_interval = 50;
    config.general.retry_attempts = 2;
    config.general.retry_base_delay = 1;
    config.general.retry_max_delay = 2;
    config.cache.ttl_ms = 30_000;
    config.cache.swr_ms = 120_000;
    config
}

/// Two memory shards behind a gateway, with every tenant routed to
/// shard-a by the initial policy. The invalidation consumer is driven
/// manually via `process_batch`.
pub async fn harness(config: Config) -> Harness {
    let kv = Arc::new(MemoryKv::new());
    let cache = Cache::new(kv.clone());
    let queue = Arc::new(MemoryQueue::new());
    let shutdown = CancellationToken::new();

    let client = ShardClient::new(
        Breakers::new(config.breaker),
        Backoff::from_config(&config.general),
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

    let policy_store: Arc<dyn PolicyStore> = policy.clone();
    let queue_store: Arc<dyn Queue> = queue.clone();
    let engine = Arc::new(Engine::new(
        cache.clone(),
        policy_store,
        client.clone(),
        queue_store,
        &config,
        shutdown.clone(),
    ));
    let gateway = Gateway::new(engine.clone(), &config, shutdown);

    let consumer = InvalidationConsumer::new(
        queue.clone(),
        cache.clone(),
        kv.clone(),
        &config.limits,
        Backoff::new(2, Duration::from_millis(1), Duration::from_millis(2)),
    );

    Harness {
        gateway,
        engine,
        cache,
        kv,
        queue,
        consumer,
        policy,
        client,
        shard_a,
        shard_b,
        config,
    }
}

pub fn principal(tenant: &str) -> Principal {
    Principal::new(tenant)
}

/// A second consumer over the same bus and cache, for tests that run
/// the consume loop in the background.
pub fn consumer(harness: &Harness) -> InvalidationConsumer {
    InvalidationConsumer::new(
        harness.queue.clone(),
        harness.cache.clone(),
        harness.kv.clone(),
        &harness.config.limits,
        Backoff::new(2, Duration::from_millis(1), Duration::from_millis(2)),
    )
}

/// The cache key the engine derives for a statement: hint stripped,
/// tenant-isolation applied, then fingerprinted.
pub fn query_cache_key(tenant: &str, table: &str, sql: &str) -> String {
    let stripped = hint::strip(sql);
    let classification = classify(sql);
    let rewritten = isolation::rewrite(stripped, &classification, &tenant.into(), false).unwrap();
    key::query(&tenant.into(), table, key::fingerprint(&rewritten, &[]))
}

/// Settle the invalidation bus.
pub async fn drain_queue(harness: &Harness) {
    while harness.consumer.process_batch().await.unwrap() > 0 {}
}
