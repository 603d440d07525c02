use thiserror::Error;

use super::plan::Phase;
use crate::backend::ShardId;
use crate::routing::TenantId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("split plan \"{0}\" not found")]
    NotFound(String),

    #[error("phase cannot move from {0} to {1}")]
    InvalidTransition(Phase, Phase),

    #[error("tenant \"{0}\" is already part of an in-flight plan")]
    TenantBusy(TenantId),

    #[error("target shard \"{0}\" already holds rows for tenant \"{1}\"")]
    TargetNotEmpty(ShardId, TenantId),

    #[error("{0}")]
    Routing(#[from] crate::routing::Error),

    #[error("{0}")]
    Backend(#[from] crate::backend::Error),

    #[error("{0}")]
    Kv(#[from] crate::cache::Error),

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}
