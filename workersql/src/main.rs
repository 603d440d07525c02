use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::select;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workersql::backend::{ShardClient, ShardId};
use workersql::cache::{Cache, MemoryKv};
use workersql::cli::{classify_query, config_check, Cli, Commands};
use workersql::config;
use workersql::engine::Engine;
use workersql::frontend::Gateway;
use workersql::healthcheck;
use workersql::queue::{InvalidationConsumer, MemoryQueue};
use workersql::routing::{KvPolicyStore, RangeRule, RoutingPolicy};
use workersql::split::SplitController;
use workersql::stats;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.clone() {
        Some(Commands::Configcheck) => {
            config_check(&cli.config)?;
            info!("configuration ok");
            Ok(())
        }
        Some(Commands::Classify { query }) => {
            classify_query(&query);
            Ok(())
        }
        command => {
            let config = config::load(&cli.config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.general.workers.max(1))
                .enable_all()
                .build()?;
            runtime.block_on(run(command, cli.config.clone()))
        }
    }
}

async fn run(
    command: Option<Commands>,
    config_path: std::path::PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::config();
    let shutdown = CancellationToken::new();

    let sighup_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = workersql::sighup::reload_loop(config_path, sighup_token).await {
            error!("SIGHUP listener failed: {}", err);
        }
    });

    // Durable state and the event bus are external services in
    // production; the embedded stores back single-node deployments.
    let kv = Arc::new(MemoryKv::new());
    let cache = Cache::new(kv.clone());
    let queue = Arc::new(MemoryQueue::new());
    let client = ShardClient::from_config(&config)?;

    let policy = Arc::new(KvPolicyStore::new(kv.clone()));
    let ranges = config
        .sharding
        .ranges
        .iter()
        .map(|range| RangeRule {
            prefix: range.prefix.clone(),
            shard: ShardId::from(range.shard.as_str()),
        })
        .collect::<Vec<_>>();
    policy.ensure_active(RoutingPolicy::new(ranges)).await?;

    let engine = Arc::new(Engine::new(
        cache.clone(),
        policy.clone(),
        client.clone(),
        queue.clone(),
        &config,
        shutdown.clone(),
    ));

    // The HTTP/WebSocket transport embeds these; the binary hosts the
    // operational surfaces around them.
    let gateway = Arc::new(Gateway::new(engine.clone(), &config, shutdown.clone()));
    let _controller = SplitController::new(kv.clone(), policy.clone(), client.clone(), &config);
    info!(
        "gateway ready: {} shards, {} sticky sessions",
        client.shard_ids().len(),
        gateway.sessions().len()
    );

    let consumer = InvalidationConsumer::new(
        queue.clone(),
        cache.clone(),
        kv.clone(),
        &config.limits,
        workersql::backend::Backoff::from_config(&config.general),
    );
    let consumer_token = shutdown.child_token();
    tokio::spawn(async move { consumer.run(consumer_token).await });

    let (mut openmetrics_port, mut healthcheck_port) =
        (config.general.openmetrics_port, config.general.healthcheck_port);
    if let Some(Commands::Run {
        openmetrics_port: metrics_override,
        healthcheck_port: health_override,
    }) = command
    {
        openmetrics_port = metrics_override.or(openmetrics_port);
        healthcheck_port = health_override.or(healthcheck_port);
    }

    if let Some(port) = openmetrics_port {
        let namespace = config.general.openmetrics_namespace.clone();
        tokio::spawn(async move {
            if let Err(err) = stats::http_server::server(port, namespace).await {
                error!("OpenMetrics server failed: {}", err);
            }
        });
    }

    if let Some(port) = healthcheck_port {
        let breakers = client.breakers().clone();
        tokio::spawn(async move {
            if let Err(err) = healthcheck::server(port, breakers).await {
                error!("healthcheck server failed: {}", err);
            }
        });
    }

    select! {
        _ = ctrl_c() => {
            info!("shutting down");
        }
    }

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(
        config.general.shutdown_timeout.min(2_000),
    ))
    .await;

    Ok(())
}
