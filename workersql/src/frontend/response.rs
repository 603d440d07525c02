//! Wire response shapes shared by every endpoint.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backend::{ExecuteResult, Row, ShardId};
use crate::engine::ReadOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidQuery,
    ConnectionError,
    TimeoutError,
    AuthError,
    PermissionError,
    ResourceLimit,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidQuery => 400,
            ErrorCode::ConnectionError => 503,
            ErrorCode::TimeoutError => 504,
            ErrorCode::AuthError => 401,
            ErrorCode::PermissionError => 403,
            ErrorCode::ResourceLimit => 429,
            ErrorCode::InternalError => 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status for this envelope. The batch clamps (`MAX_OPS` and
    /// `MAX_BYTES`) report 413; other resource limits 429.
    pub fn http_status(&self) -> u16 {
        let clamped = matches!(
            self.details
                .as_ref()
                .and_then(|details| details.get("limit"))
                .and_then(|limit| limit.as_str()),
            Some("max_bytes") | Some("max_ops")
        );
        if self.code == ErrorCode::ResourceLimit && clamped {
            413
        } else {
            self.code.http_status()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(rename = "shardId")]
    pub shard_id: ShardId,
    #[serde(rename = "fromCache")]
    pub from_cache: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub data: Vec<Row>,
    pub cached: bool,
    #[serde(rename = "executionTime")]
    pub execution_time: f64,
    pub metadata: ResponseMetadata,
}

impl QueryResponse {
    pub fn from_read(outcome: ReadOutcome, execution_time: f64) -> Self {
        Self {
            success: true,
            data: outcome.rows,
            cached: outcome.cached,
            execution_time,
            metadata: ResponseMetadata {
                shard_id: outcome.shard,
                from_cache: outcome.cached,
                version: outcome.version,
            },
        }
    }

    pub fn from_execute(result: ExecuteResult, shard: ShardId, execution_time: f64) -> Self {
        Self {
            success: true,
            data: result.rows,
            cached: false,
            execution_time,
            metadata: ResponseMetadata {
                shard_id: shard,
                from_cache: false,
                version: result.version,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_code_status_map() {
        assert_eq!(ErrorCode::InvalidQuery.http_status(), 400);
        assert_eq!(ErrorCode::ConnectionError.http_status(), 503);
        assert_eq!(ErrorCode::TimeoutError.http_status(), 504);
        assert_eq!(ErrorCode::AuthError.http_status(), 401);
        assert_eq!(ErrorCode::PermissionError.http_status(), 403);
        assert_eq!(ErrorCode::ResourceLimit.http_status(), 429);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = ErrorEnvelope::new(ErrorCode::InvalidQuery, "bad statement");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["code"], "INVALID_QUERY");
        assert_eq!(json["message"], "bad statement");
        assert!(json.get("details").is_none());
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
