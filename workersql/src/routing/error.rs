use thiserror::Error;

use super::policy::TenantId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no route for tenant \"{0}\"")]
    NoRoute(TenantId),

    #[error("no active routing policy")]
    NoActivePolicy,

    #[error("routing policy version {0} does not exist")]
    UnknownVersion(u64),

    #[error("publish contention, retries exhausted")]
    Contention,

    #[error("{0}")]
    Kv(#[from] crate::cache::Error),

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}
