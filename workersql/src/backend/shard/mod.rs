//! Shard actor types and transports. A shard is a single-writer actor:
//! per shard, mutations are totally ordered and assigned ascending
//! `version` values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::routing::TenantId;

pub mod http;
pub mod memory;
pub mod transport;

pub use http::HttpShard;
pub use memory::MemoryShard;
pub use transport::ShardTransport;

/// Identifies a single-writer shard actor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ShardId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// SQL parameter. Serialization preserves the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Param {
    /// Rough wire size, used by the batch payload clamp.
    pub fn approx_size(&self) -> usize {
        match self {
            Param::Null => 4,
            Param::Bool(_) => 5,
            Param::Int(_) | Param::Float(_) => 8,
            Param::Str(s) => s.len(),
            Param::Bytes(b) => b.len(),
        }
    }
}

/// A row as returned by a shard. Opaque to the gateway.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A statement plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: vec![],
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn approx_size(&self) -> usize {
        self.sql.len() + self.params.iter().map(Param::approx_size).sum::<usize>()
    }
}

/// Result of executing one statement on a shard. `version` is the
/// shard's monotonic mutation counter after execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default)]
    pub insert_id: Option<u64>,
    pub version: u64,
}

/// One page of a cursor-driven bulk export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPage {
    pub rows: Vec<Row>,
    pub next_cursor: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Mutation,
    Ddl,
}

/// Emitted by a shard on every successful write. `id` is per-shard
/// monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: i64,
    pub ts: i64,
    pub tenant_id: TenantId,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(rename = "type")]
    pub kind: EventKind,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_param_tag_preserved() {
        let params = vec![
            Param::Null,
            Param::Bool(true),
            Param::Int(-7),
            Param::Float(1.5),
            Param::Str("x".into()),
            Param::Bytes(vec![0, 1]),
        ];
        let json = serde_json::to_string(&params).unwrap();
        let back: Vec<Param> = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
        assert!(json.contains(r#""type":"int""#));
        assert!(json.contains(r#""type":"bytes""#));
    }

    #[test]
    fn test_statement_size() {
        let stmt = Statement::with_params("SELECT ?", vec![Param::Str("abcd".into())]);
        assert_eq!(stmt.approx_size(), "SELECT ?".len() + 4);
    }
}
