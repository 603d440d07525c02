//! WebSocket message envelopes for transactional sticky sessions.
//! The transport ferries these verbatim; the gateway only defines the
//! contract.

use serde::{Deserialize, Serialize};

use super::response::ErrorEnvelope;
use crate::backend::Param;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsKind {
    Begin,
    Query,
    Commit,
    Rollback,
    Error,
}

/// One message on the transactional WebSocket. `transaction_id` is
/// server-assigned on `begin` and pins the session to one shard until
/// a terminal operation or disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: WsKind,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Param>>,
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl WsEnvelope {
    fn bare(kind: WsKind, id: u64) -> Self {
        Self {
            kind,
            id,
            sql: None,
            params: None,
            transaction_id: None,
            data: None,
            error: None,
        }
    }

    pub fn begin(id: u64) -> Self {
        Self::bare(WsKind::Begin, id)
    }

    pub fn query(id: u64, sql: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            transaction_id: Some(transaction_id.into()),
            ..Self::bare(WsKind::Query, id)
        }
    }

    pub fn commit(id: u64, transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            ..Self::bare(WsKind::Commit, id)
        }
    }

    pub fn rollback(id: u64, transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            ..Self::bare(WsKind::Rollback, id)
        }
    }

    /// Error reply; the transport closes the socket with a non-1000
    /// code after sending it.
    pub fn error(id: u64, error: ErrorEnvelope) -> Self {
        Self {
            error: Some(error),
            ..Self::bare(WsKind::Error, id)
        }
    }
}
