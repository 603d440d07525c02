//! HTTP+JSON shard transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use workersql_config::Dsn;

use super::{EventKind, ExecuteResult, ExportPage, MutationEvent, Row, Statement};
use super::transport::ShardTransport;
use crate::backend::Error;
use crate::routing::TenantId;

/// Talks to a remote shard actor over its HTTP surface.
pub struct HttpShard {
    base: String,
    client: reqwest::Client,
}

impl HttpShard {
    pub fn new(dsn: &Dsn, connect_timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base: dsn.base_url(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            400 => Error::InvalidQuery(message),
            401 | 403 => Error::Permission(message),
            409 => Error::Integrity(message),
            413 | 429 => Error::ResourceLimit(message),
            504 => Error::Timeout,
            _ => Error::Connection(format!("{}: {}", status, message)),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, Error> {
        let response = self.client.post(self.url(path)).json(&body).send().await?;
        Ok(Self::check(response).await?.json::<T>().await?)
    }
}

#[async_trait]
impl ShardTransport for HttpShard {
    async fn execute(&self, stmt: &Statement) -> Result<ExecuteResult, Error> {
        self.post("execute", json!({ "sql": stmt.sql, "params": stmt.params }))
            .await
    }

    async fn execute_batch(&self, stmts: &[Statement]) -> Result<Vec<ExecuteResult>, Error> {
        #[derive(Deserialize)]
        struct BatchResponse {
            results: Vec<ExecuteResult>,
        }

        let response: BatchResponse = self.post("batch", json!({ "batch": stmts })).await?;
        Ok(response.results)
    }

    async fn export(
        &self,
        table: &str,
        tenant: &TenantId,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<ExportPage, Error> {
        self.post(
            "export",
            json!({
                "table": table,
                "tenant_id": tenant,
                "cursor": cursor,
                "limit": limit,
            }),
        )
        .await
    }

    async fn import(&self, table: &str, rows: &[Row]) -> Result<u64, Error> {
        #[derive(Deserialize)]
        struct ImportResponse {
            imported: u64,
        }

        let response: ImportResponse = self
            .post("import", json!({ "table": table, "rows": rows }))
            .await?;
        Ok(response.imported)
    }

    async fn events(&self, after_id: i64, limit: usize) -> Result<Vec<MutationEvent>, Error> {
        let response = self
            .client
            .get(self.url("events"))
            .query(&[("after_id", after_id.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn tables(&self) -> Result<Vec<String>, Error> {
        let response = self.client.get(self.url("tables")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn apply(&self, event: &MutationEvent) -> Result<ExecuteResult, Error> {
        let path = match event.kind {
            EventKind::Mutation => "mutation",
            EventKind::Ddl => "ddl",
        };
        self.post(path, json!({ "sql": event.sql, "params": event.params }))
            .await
    }
}
