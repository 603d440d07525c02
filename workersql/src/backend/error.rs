//! Backend errors.

use thiserror::Error;

use super::shard::ShardId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection: {0}")]
    Connection(String),

    #[error("shard call timed out")]
    Timeout,

    #[error("resource limit: {0}")]
    ResourceLimit(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("circuit open for shard \"{0}\"")]
    CircuitOpen(ShardId),

    #[error("unknown shard \"{0}\"")]
    UnknownShard(ShardId),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("shard actor is gone")]
    ActorGone,
}

impl Error {
    /// Transient errors are retried with backoff and count toward
    /// the circuit breaker. Everything else surfaces immediately.
    pub fn transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Timeout
                | Error::ResourceLimit(_)
                | Error::Http(_)
                | Error::ActorGone
        )
    }
}
