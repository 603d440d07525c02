//! Frontend errors and their mapping onto the wire error taxonomy.

use thiserror::Error;

use super::response::{ErrorCode, ErrorEnvelope};

#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication required")]
    Auth,

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("batch exceeds the {0} operation limit")]
    TooManyOps(usize),

    #[error("batch exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("unknown transaction \"{0}\"")]
    UnknownTransaction(String),

    #[error("{0}")]
    Engine(#[from] crate::engine::Error),

    #[error("{0}")]
    Backend(#[from] crate::backend::Error),

    #[error("{0}")]
    Routing(#[from] crate::routing::Error),

    #[error("{0}")]
    Cache(#[from] crate::cache::Error),

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Auth => ErrorCode::AuthError,
            Error::Permission(_) => ErrorCode::PermissionError,
            Error::InvalidQuery(_) | Error::UnknownTransaction(_) => ErrorCode::InvalidQuery,
            Error::TooManyOps(_) | Error::PayloadTooLarge(_) => ErrorCode::ResourceLimit,
            Error::Engine(err) => engine_code(err),
            Error::Backend(err) => backend_code(err),
            Error::Routing(_) => ErrorCode::InternalError,
            Error::Cache(_) | Error::Serde(_) => ErrorCode::InternalError,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let envelope = ErrorEnvelope::new(self.code(), self.to_string());
        match self {
            // Batch clamps answer 413 rather than 429.
            Error::PayloadTooLarge(limit) => envelope.with_details(serde_json::json!({
                "limit": "max_bytes",
                "max_bytes": limit,
            })),
            Error::TooManyOps(limit) => envelope.with_details(serde_json::json!({
                "limit": "max_ops",
                "max_ops": limit,
            })),
            _ => envelope,
        }
    }
}

fn engine_code(err: &crate::engine::Error) -> ErrorCode {
    use crate::engine::Error as EngineError;
    match err {
        EngineError::Backend(err) => backend_code(err),
        EngineError::Routing(_) => ErrorCode::InternalError,
        EngineError::Cache(_) | EngineError::Queue(_) => ErrorCode::InternalError,
    }
}

fn backend_code(err: &crate::backend::Error) -> ErrorCode {
    use crate::backend::Error as BackendError;
    match err {
        BackendError::Timeout | BackendError::Cancelled => ErrorCode::TimeoutError,
        BackendError::Connection(_)
        | BackendError::CircuitOpen(_)
        | BackendError::Http(_)
        | BackendError::ActorGone => ErrorCode::ConnectionError,
        BackendError::InvalidQuery(_) | BackendError::Integrity(_) => ErrorCode::InvalidQuery,
        BackendError::Permission(_) => ErrorCode::PermissionError,
        BackendError::ResourceLimit(_) => ErrorCode::ResourceLimit,
        BackendError::UnknownShard(_) | BackendError::Json(_) => ErrorCode::InternalError,
    }
}
