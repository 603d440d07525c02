//! Shard actor client: transport registry, retries, deadlines and
//! circuit breaking in front of every shard call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::select;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use workersql_config::Config;

use super::breaker::Breakers;
use super::retry::Backoff;
use super::shard::{
    ExecuteResult, ExportPage, HttpShard, MutationEvent, Row, ShardId, ShardTransport, Statement,
};
use super::Error;
use crate::routing::TenantId;
use crate::stats::{counters, Counters};
use crate::util::Deadline;

#[derive(Clone)]
pub struct ShardClient {
    transports: Arc<DashMap<ShardId, Arc<dyn ShardTransport>>>,
    breakers: Breakers,
    backoff: Backoff,
}

impl ShardClient {
    pub fn new(breakers: Breakers, backoff: Backoff) -> Self {
        Self {
            transports: Arc::new(DashMap::new()),
            breakers,
            backoff,
        }
    }

    /// Build HTTP transports for every configured shard.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let client = Self::new(
            Breakers::new(config.breaker),
            Backoff::from_config(&config.general),
        );
        let connect_timeout = Duration::from_millis(config.general.connect_timeout);
        for shard in &config.shards {
            let dsn = shard
                .url
                .parse()
                .map_err(|err| Error::Connection(format!("{}: {}", shard.name, err)))?;
            client.add_shard(
                ShardId::from(shard.name.as_str()),
                Arc::new(HttpShard::new(&dsn, connect_timeout)?),
            );
        }
        Ok(client)
    }

    pub fn add_shard(&self, id: ShardId, transport: Arc<dyn ShardTransport>) {
        self.transports.insert(id, transport);
    }

    pub fn breakers(&self) -> &Breakers {
        &self.breakers
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.transports.iter().map(|e| e.key().clone()).collect()
    }

    fn transport(&self, shard: &ShardId) -> Result<Arc<dyn ShardTransport>, Error> {
        self.transports
            .get(shard)
            .map(|t| t.clone())
            .ok_or_else(|| Error::UnknownShard(shard.clone()))
    }

    /// Run one shard call with breaker admission, deadline enforcement
    /// and retries on transient errors.
    async fn call<T, F, Fut>(
        &self,
        shard: &ShardId,
        deadline: Deadline,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, Error>
    where
        F: Fn(Arc<dyn ShardTransport>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let transport = self.transport(shard)?;
        let breaker = self.breakers.get(shard);
        let mut attempt = 0;

        loop {
            if let Err(err) = breaker.check() {
                Counters::incr(&counters().breaker_rejections);
                return Err(err);
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }

            let result = select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                result = timeout(deadline.remaining(), f(transport.clone())) => {
                    result.unwrap_or(Err(Error::Timeout))
                }
            };

            match result {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) if err.transient() => {
                    breaker.record_failure();
                    if attempt + 1 >= self.backoff.attempts {
                        return Err(err);
                    }
                    let delay = self.backoff.delay(attempt).min(deadline.remaining());
                    debug!(
                        "retrying call to shard \"{}\" after {:?}: {}",
                        shard, delay, err
                    );
                    Counters::incr(&counters().retries);
                    select! {
                        biased;
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        _ = sleep(delay) => (),
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn execute(
        &self,
        shard: &ShardId,
        stmt: &Statement,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<ExecuteResult, Error> {
        let stmt = stmt.clone();
        self.call(shard, deadline, token, move |transport| {
            let stmt = stmt.clone();
            async move { transport.execute(&stmt).await }
        })
        .await
    }

    pub async fn execute_batch(
        &self,
        shard: &ShardId,
        stmts: &[Statement],
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<Vec<ExecuteResult>, Error> {
        let stmts = stmts.to_vec();
        self.call(shard, deadline, token, move |transport| {
            let stmts = stmts.clone();
            async move { transport.execute_batch(&stmts).await }
        })
        .await
    }

    pub async fn export(
        &self,
        shard: &ShardId,
        table: &str,
        tenant: &TenantId,
        cursor: Option<u64>,
        limit: usize,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<ExportPage, Error> {
        let table = table.to_string();
        let tenant = tenant.clone();
        self.call(shard, deadline, token, move |transport| {
            let table = table.clone();
            let tenant = tenant.clone();
            async move { transport.export(&table, &tenant, cursor, limit).await }
        })
        .await
    }

    pub async fn import(
        &self,
        shard: &ShardId,
        table: &str,
        rows: &[Row],
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<u64, Error> {
        let table = table.to_string();
        let rows = rows.to_vec();
        self.call(shard, deadline, token, move |transport| {
            let table = table.clone();
            let rows = rows.clone();
            async move { transport.import(&table, &rows).await }
        })
        .await
    }

    pub async fn events(
        &self,
        shard: &ShardId,
        after_id: i64,
        limit: usize,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<Vec<MutationEvent>, Error> {
        self.call(shard, deadline, token, move |transport| async move {
            transport.events(after_id, limit).await
        })
        .await
    }

    pub async fn tables(
        &self,
        shard: &ShardId,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<Vec<String>, Error> {
        self.call(shard, deadline, token, move |transport| async move {
            transport.tables().await
        })
        .await
    }

    pub async fn apply(
        &self,
        shard: &ShardId,
        event: &MutationEvent,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<ExecuteResult, Error> {
        let event = event.clone();
        self.call(shard, deadline, token, move |transport| {
            let event = event.clone();
            async move { transport.apply(&event).await }
        })
        .await
    }
}
