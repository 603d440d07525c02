//! In-process shard actor. The actor task is the sequential boundary:
//! it owns all table data, applies mutations in arrival order and
//! assigns ascending versions. Understands the small SQL subset the
//! gateway emits; deployments front real engines with [`super::HttpShard`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::transport::ShardTransport;
use super::{EventKind, ExecuteResult, ExportPage, MutationEvent, Row, ShardId, Statement};
use crate::backend::Error;
use crate::routing::TenantId;
use crate::util::now_ms;

static FROM_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfrom\s+`?([A-Za-z0-9_]+)`?").unwrap());
static UPDATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*update\s+`?([A-Za-z0-9_]+)`?").unwrap());
static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:create|alter|drop|truncate)\s+table\s+(?:if\s+(?:not\s+)?exists\s+)?`?([A-Za-z0-9_]+)`?")
        .unwrap()
});
static INSERT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*(?:insert|replace)\s+into\s+`?([A-Za-z0-9_]+)`?\s*\(([^)]*)\)\s*values\s*(.+)$")
        .unwrap()
});
static TENANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tenant_id\s*=\s*'((?:[^']|'')*)'").unwrap());
static ID_EQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bid\s*=\s*(\d+)").unwrap());
static SET_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bset\s+(.+?)(?:\bwhere\b|$)").unwrap());

enum Command {
    Execute {
        stmt: Statement,
        reply: oneshot::Sender<Result<ExecuteResult, Error>>,
    },
    ExecuteBatch {
        stmts: Vec<Statement>,
        reply: oneshot::Sender<Result<Vec<ExecuteResult>, Error>>,
    },
    Export {
        table: String,
        tenant: TenantId,
        cursor: Option<u64>,
        limit: usize,
        reply: oneshot::Sender<Result<ExportPage, Error>>,
    },
    Import {
        table: String,
        rows: Vec<Row>,
        reply: oneshot::Sender<Result<u64, Error>>,
    },
    Events {
        after_id: i64,
        limit: usize,
        reply: oneshot::Sender<Vec<MutationEvent>>,
    },
    Tables {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to an in-process shard actor.
#[derive(Clone)]
pub struct MemoryShard {
    name: ShardId,
    tx: mpsc::Sender<Command>,
}

impl MemoryShard {
    pub fn new(name: impl Into<ShardId>) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(256);
        let actor = Actor {
            name: name.clone(),
            tables: BTreeMap::new(),
            version: 0,
            log: vec![],
            next_pk: 1,
        };
        tokio::spawn(actor.run(rx));
        Self { name, tx }
    }

    pub fn name(&self) -> &ShardId {
        &self.name
    }

    async fn send(&self, command: Command) -> Result<(), Error> {
        self.tx.send(command).await.map_err(|_| Error::ActorGone)
    }
}

#[async_trait]
impl ShardTransport for MemoryShard {
    async fn execute(&self, stmt: &Statement) -> Result<ExecuteResult, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Execute {
            stmt: stmt.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ActorGone)?
    }

    async fn execute_batch(&self, stmts: &[Statement]) -> Result<Vec<ExecuteResult>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ExecuteBatch {
            stmts: stmts.to_vec(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ActorGone)?
    }

    async fn export(
        &self,
        table: &str,
        tenant: &TenantId,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<ExportPage, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Export {
            table: table.to_string(),
            tenant: tenant.clone(),
            cursor,
            limit,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ActorGone)?
    }

    async fn import(&self, table: &str, rows: &[Row]) -> Result<u64, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Import {
            table: table.to_string(),
            rows: rows.to_vec(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ActorGone)?
    }

    async fn events(&self, after_id: i64, limit: usize) -> Result<Vec<MutationEvent>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Events {
            after_id,
            limit,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ActorGone)
    }

    async fn tables(&self) -> Result<Vec<String>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Tables { reply }).await?;
        rx.await.map_err(|_| Error::ActorGone)
    }
}

struct Actor {
    name: ShardId,
    tables: BTreeMap<String, BTreeMap<u64, Row>>,
    version: u64,
    log: Vec<MutationEvent>,
    next_pk: u64,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Execute { stmt, reply } => {
                    let _ = reply.send(self.execute(&stmt));
                }
                Command::ExecuteBatch { stmts, reply } => {
                    let _ = reply.send(self.execute_batch(&stmts));
                }
                Command::Export {
                    table,
                    tenant,
                    cursor,
                    limit,
                    reply,
                } => {
                    let _ = reply.send(Ok(self.export(&table, &tenant, cursor, limit)));
                }
                Command::Import { table, rows, reply } => {
                    let _ = reply.send(Ok(self.import(&table, &rows)));
                }
                Command::Events {
                    after_id,
                    limit,
                    reply,
                } => {
                    let events = self
                        .log
                        .iter()
                        .filter(|e| e.id > after_id)
                        .take(limit)
                        .cloned()
                        .collect();
                    let _ = reply.send(events);
                }
                Command::Tables { reply } => {
                    let _ = reply.send(self.tables.keys().cloned().collect());
                }
            }
        }
        debug!("shard actor {} shutting down", self.name);
    }

    fn execute(&mut self, stmt: &Statement) -> Result<ExecuteResult, Error> {
        let sql = skip_comments(stmt.sql.trim());
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" => Ok(self.select(sql)),
            "INSERT" | "REPLACE" => self.insert(sql),
            "UPDATE" => self.update(sql),
            "DELETE" => Ok(self.delete(sql)),
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" => Ok(self.ddl(sql)),
            _ => Ok(ExecuteResult {
                version: self.version,
                ..Default::default()
            }),
        }
    }

    /// Atomic on the actor: any failure rolls the batch back.
    fn execute_batch(&mut self, stmts: &[Statement]) -> Result<Vec<ExecuteResult>, Error> {
        let checkpoint = (self.tables.clone(), self.version, self.log.len(), self.next_pk);

        let mut results = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match self.execute(stmt) {
                Ok(result) => results.push(result),
                Err(err) => {
                    self.tables = checkpoint.0;
                    self.version = checkpoint.1;
                    self.log.truncate(checkpoint.2);
                    self.next_pk = checkpoint.3;
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    fn select(&self, sql: &str) -> ExecuteResult {
        let table = FROM_TABLE.captures(sql).map(|c| c[1].to_string());
        let rows = match table.and_then(|t| self.tables.get(&t)) {
            Some(rows) => filter_rows(rows, sql),
            None => vec![],
        };
        ExecuteResult {
            rows,
            version: self.version,
            ..Default::default()
        }
    }

    fn insert(&mut self, sql: &str) -> Result<ExecuteResult, Error> {
        let captures = INSERT
            .captures(sql)
            .ok_or_else(|| Error::InvalidQuery("unparseable INSERT".into()))?;
        let table = captures[1].to_string();
        let columns = captures[2]
            .split(',')
            .map(|c| c.trim().trim_matches('`').to_string())
            .collect::<Vec<_>>();
        let tuples = split_tuples(&captures[3]);

        let mut last_pk = None;
        let mut count = 0;
        for tuple in &tuples {
            let values = split_scalars(tuple);
            if values.len() != columns.len() {
                return Err(Error::InvalidQuery(format!(
                    "column count {} does not match value count {}",
                    columns.len(),
                    values.len()
                )));
            }
            let mut row = Row::new();
            for (column, value) in columns.iter().zip(values) {
                row.insert(column.clone(), parse_scalar(&value));
            }
            let pk = match row.get("id").and_then(|v| v.as_u64()) {
                Some(pk) => pk,
                None => {
                    let pk = self.next_pk;
                    row.insert("id".into(), pk.into());
                    pk
                }
            };
            self.next_pk = self.next_pk.max(pk + 1);
            self.tables.entry(table.clone()).or_default().insert(pk, row);
            last_pk = Some(pk);
            count += 1;
        }

        let version = self.commit(sql, EventKind::Mutation);
        Ok(ExecuteResult {
            rows: vec![],
            rows_affected: count,
            insert_id: last_pk,
            version,
        })
    }

    fn update(&mut self, sql: &str) -> Result<ExecuteResult, Error> {
        let table = UPDATE_TABLE.captures(sql).map(|c| c[1].to_string());
        let assignments = SET_CLAUSE
            .captures(sql)
            .map(|c| parse_assignments(&c[1]))
            .unwrap_or_default();

        let mut affected = 0;
        if let Some(rows) = table.and_then(|t| self.tables.get_mut(&t)) {
            let matches = matching_pks(rows, sql);
            for pk in matches {
                if let Some(row) = rows.get_mut(&pk) {
                    for (column, value) in &assignments {
                        row.insert(column.clone(), value.clone());
                    }
                    affected += 1;
                }
            }
        }

        let version = self.commit(sql, EventKind::Mutation);
        Ok(ExecuteResult {
            rows: vec![],
            rows_affected: affected,
            insert_id: None,
            version,
        })
    }

    fn delete(&mut self, sql: &str) -> ExecuteResult {
        let table = FROM_TABLE.captures(sql).map(|c| c[1].to_string());
        let mut affected = 0;
        if let Some(rows) = table.and_then(|t| self.tables.get_mut(&t)) {
            for pk in matching_pks(rows, sql) {
                rows.remove(&pk);
                affected += 1;
            }
        }
        let version = self.commit(sql, EventKind::Mutation);
        ExecuteResult {
            rows: vec![],
            rows_affected: affected,
            insert_id: None,
            version,
        }
    }

    fn ddl(&mut self, sql: &str) -> ExecuteResult {
        if let Some(captures) = CREATE_TABLE.captures(sql) {
            let table = captures[1].to_string();
            let upper = sql.trim_start().to_ascii_uppercase();
            if upper.starts_with("DROP") {
                self.tables.remove(&table);
            } else {
                self.tables.entry(table).or_default();
            }
        }
        let version = self.commit(sql, EventKind::Ddl);
        ExecuteResult {
            version,
            ..Default::default()
        }
    }

    /// Assign the next version and append to the mutation log.
    fn commit(&mut self, sql: &str, kind: EventKind) -> u64 {
        self.version += 1;
        let tenant = TENANT
            .captures(sql)
            .map(|c| c[1].replace("''", "'"))
            .unwrap_or_default();
        self.log.push(MutationEvent {
            id: self.version as i64,
            ts: now_ms(),
            tenant_id: TenantId::from(tenant),
            sql: sql.to_string(),
            params: vec![],
            kind,
        });
        self.version
    }

    fn export(
        &self,
        table: &str,
        tenant: &TenantId,
        cursor: Option<u64>,
        limit: usize,
    ) -> ExportPage {
        let start = cursor.unwrap_or(0);
        let rows = match self.tables.get(table) {
            Some(rows) => rows
                .range(start + 1..)
                .filter(|(_, row)| row_tenant(row) == Some(tenant.as_str()))
                .take(limit)
                .map(|(_, row)| row.clone())
                .collect::<Vec<_>>(),
            None => vec![],
        };

        let next_cursor = if rows.len() == limit {
            rows.last()
                .and_then(|row| row.get("id"))
                .and_then(|id| id.as_u64())
        } else {
            None
        };

        ExportPage { rows, next_cursor }
    }

    /// Idempotent upsert keyed by primary key. Imports bypass the
    /// mutation log.
    fn import(&mut self, table: &str, rows: &[Row]) -> u64 {
        let target = self.tables.entry(table.to_string()).or_default();
        let mut imported = 0;
        for row in rows {
            let pk = match row.get("id").and_then(|v| v.as_u64()) {
                Some(pk) => pk,
                None => {
                    let pk = self.next_pk;
                    self.next_pk += 1;
                    pk
                }
            };
            self.next_pk = self.next_pk.max(pk + 1);
            target.insert(pk, row.clone());
            imported += 1;
        }
        imported
    }
}

fn row_tenant(row: &Row) -> Option<&str> {
    row.get("tenant_id").and_then(|v| v.as_str())
}

fn skip_comments(sql: &str) -> &str {
    let mut out = sql;
    while out.starts_with("/*") {
        match out.find("*/") {
            Some(end) => out = out[end + 2..].trim_start(),
            None => break,
        }
    }
    out
}

fn filter_rows(rows: &BTreeMap<u64, Row>, sql: &str) -> Vec<Row> {
    let tenant = TENANT.captures(sql).map(|c| c[1].replace("''", "'"));
    let id = ID_EQ.captures(sql).and_then(|c| c[1].parse::<u64>().ok());

    rows.iter()
        .filter(|(pk, row)| {
            let tenant_ok = match &tenant {
                Some(t) => row_tenant(row) == Some(t.as_str()),
                None => true,
            };
            let id_ok = match id {
                Some(id) => **pk == id,
                None => true,
            };
            tenant_ok && id_ok
        })
        .map(|(_, row)| row.clone())
        .collect()
}

fn matching_pks(rows: &BTreeMap<u64, Row>, sql: &str) -> Vec<u64> {
    let tenant = TENANT.captures(sql).map(|c| c[1].replace("''", "'"));
    let id = ID_EQ.captures(sql).and_then(|c| c[1].parse::<u64>().ok());

    rows.iter()
        .filter(|(pk, row)| {
            let tenant_ok = match &tenant {
                Some(t) => row_tenant(row) == Some(t.as_str()),
                None => true,
            };
            let id_ok = match id {
                Some(id) => **pk == id,
                None => true,
            };
            tenant_ok && id_ok
        })
        .map(|(pk, _)| *pk)
        .collect()
}

/// Split "(a, b), (c, d)" into tuple bodies, respecting quotes.
fn split_tuples(input: &str) -> Vec<String> {
    let mut tuples = vec![];
    let mut depth = 0;
    let mut in_string = false;
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // Doubled quote inside a string is an escape.
                if in_string && chars.peek() == Some(&'\'') {
                    current.push('\'');
                    current.push(chars.next().unwrap());
                    continue;
                }
                in_string = !in_string;
                if depth > 0 {
                    current.push(c);
                }
            }
            '(' if !in_string => {
                depth += 1;
                if depth == 1 {
                    current.clear();
                } else {
                    current.push(c);
                }
            }
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    tuples.push(current.trim().to_string());
                    current = String::new();
                } else {
                    current.push(c);
                }
            }
            _ => {
                if depth > 0 {
                    current.push(c);
                }
            }
        }
    }

    tuples
}

/// Split a tuple body on top-level commas, respecting quotes.
fn split_scalars(input: &str) -> Vec<String> {
    let mut out = vec![];
    let mut in_string = false;
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                if in_string && chars.peek() == Some(&'\'') {
                    current.push('\'');
                    current.push(chars.next().unwrap());
                    continue;
                }
                in_string = !in_string;
                current.push(c);
            }
            ',' if !in_string => {
                out.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }

    out
}

fn parse_scalar(input: &str) -> serde_json::Value {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return serde_json::Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return true.into();
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return false.into();
    }
    if trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2 {
        return trimmed[1..trimmed.len() - 1].replace("''", "'").into();
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return n.into();
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return f.into();
    }
    trimmed.to_string().into()
}

fn parse_assignments(input: &str) -> Vec<(String, serde_json::Value)> {
    split_scalars(input)
        .into_iter()
        .filter_map(|pair| {
            let (column, value) = pair.split_once('=')?;
            Some((
                column.trim().trim_matches('`').to_string(),
                parse_scalar(value),
            ))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn tenant(name: &str) -> TenantId {
        TenantId::from(name)
    }

    #[tokio::test]
    async fn test_insert_and_select() {
        let shard = MemoryShard::new("shard-a");
        let result = shard
            .execute(&Statement::new(
                "INSERT INTO users (id, name, tenant_id) VALUES (1, 'John', 't1'), (2, 'Jane', 't1')",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 2);
        assert_eq!(result.version, 1);
        assert_eq!(result.insert_id, Some(2));

        let result = shard
            .execute(&Statement::new(
                "SELECT * FROM users WHERE tenant_id = 't1'",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);

        let result = shard
            .execute(&Statement::new(
                "SELECT * FROM users WHERE tenant_id = 't1' AND id = 2",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["name"], "Jane");
    }

    #[tokio::test]
    async fn test_tenant_filtering() {
        let shard = MemoryShard::new("shard-a");
        shard
            .execute(&Statement::new(
                "INSERT INTO users (id, tenant_id) VALUES (1, 't1')",
            ))
            .await
            .unwrap();
        shard
            .execute(&Statement::new(
                "INSERT INTO users (id, tenant_id) VALUES (2, 't2')",
            ))
            .await
            .unwrap();

        let result = shard
            .execute(&Statement::new(
                "SELECT * FROM users WHERE tenant_id = 't2'",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["tenant_id"], "t2");
    }

    #[tokio::test]
    async fn test_versions_ascend() {
        let shard = MemoryShard::new("shard-a");
        let mut last = 0;
        for i in 0..5 {
            let result = shard
                .execute(&Statement::new(format!(
                    "INSERT INTO t (id, tenant_id) VALUES ({}, 'x')",
                    i + 1
                )))
                .await
                .unwrap();
            assert!(result.version > last);
            last = result.version;
        }

        let events = shard.events(0, 100).await.unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_export_import_round() {
        let source = MemoryShard::new("shard-a");
        let target = MemoryShard::new("shard-b");

        source
            .execute(&Statement::new(
                "INSERT INTO users (id, name, tenant_id) VALUES (1, 'a', 't1'), (2, 'b', 't1'), (3, 'c', 't2')",
            ))
            .await
            .unwrap();

        let page = source.export("users", &tenant("t1"), None, 10).await.unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.next_cursor, None);

        let imported = target.import("users", &page.rows).await.unwrap();
        assert_eq!(imported, 2);

        // Re-import is an idempotent upsert.
        target.import("users", &page.rows).await.unwrap();
        let page = target.export("users", &tenant("t1"), None, 10).await.unwrap();
        assert_eq!(page.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_export_pagination() {
        let shard = MemoryShard::new("shard-a");
        for i in 1..=5 {
            shard
                .execute(&Statement::new(format!(
                    "INSERT INTO users (id, tenant_id) VALUES ({}, 't1')",
                    i
                )))
                .await
                .unwrap();
        }

        let first = shard.export("users", &tenant("t1"), None, 2).await.unwrap();
        assert_eq!(first.rows.len(), 2);
        let cursor = first.next_cursor.unwrap();

        let second = shard
            .export("users", &tenant("t1"), Some(cursor), 2)
            .await
            .unwrap();
        assert_eq!(second.rows.len(), 2);
        assert_ne!(first.rows[0]["id"], second.rows[0]["id"]);
    }

    #[tokio::test]
    async fn test_ddl_creates_table() {
        let shard = MemoryShard::new("shard-a");
        shard
            .execute(&Statement::new(
                "CREATE TABLE IF NOT EXISTS t1_orders (id BIGINT)",
            ))
            .await
            .unwrap();
        let tables = shard.tables().await.unwrap();
        assert_eq!(tables, vec!["t1_orders".to_string()]);

        let events = shard.events(0, 10).await.unwrap();
        assert_eq!(events[0].kind, EventKind::Ddl);
    }

    #[tokio::test]
    async fn test_batch_atomic() {
        let shard = MemoryShard::new("shard-a");
        let error = shard
            .execute_batch(&[
                Statement::new("INSERT INTO t (id, tenant_id) VALUES (1, 'x')"),
                Statement::new("INSERT INTO t (id, tenant_id) VALUES (2, 'x', 'extra')"),
            ])
            .await;
        assert!(error.is_err());

        // First statement rolled back with the batch.
        let result = shard
            .execute(&Statement::new("SELECT * FROM t WHERE tenant_id = 'x'"))
            .await
            .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.version, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let shard = MemoryShard::new("shard-a");
        shard
            .execute(&Statement::new(
                "INSERT INTO users (id, name, tenant_id) VALUES (1, 'old', 't1')",
            ))
            .await
            .unwrap();

        let result = shard
            .execute(&Statement::new(
                "UPDATE users SET name = 'new' WHERE tenant_id = 't1' AND id = 1",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);

        let rows = shard
            .execute(&Statement::new("SELECT * FROM users WHERE tenant_id = 't1'"))
            .await
            .unwrap()
            .rows;
        assert_eq!(rows[0]["name"], "new");

        let result = shard
            .execute(&Statement::new(
                "DELETE FROM users WHERE tenant_id = 't1' AND id = 1",
            ))
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
    }
}
