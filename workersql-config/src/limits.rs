use serde::{Deserialize, Serialize};

/// Request and retention clamps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum number of statements in one batch.
    #[serde(default = "Limits::max_ops")]
    pub max_ops: usize,
    /// Maximum total payload of one batch, in bytes.
    #[serde(default = "Limits::max_bytes")]
    pub max_bytes: usize,
    /// How long idempotency records are kept, in milliseconds.
    #[serde(default = "Limits::idempotency_ttl")]
    pub idempotency_ttl: u64,
    /// Audit log retention.
    #[serde(default = "Limits::audit_retention_days")]
    pub audit_retention_days: u64,
    /// Give up on a queue message after this many delivery attempts.
    #[serde(default = "Limits::queue_max_retries")]
    pub queue_max_retries: u32,
    /// Queue consumer batch size.
    #[serde(default = "Limits::queue_batch_size")]
    pub queue_batch_size: usize,
}

impl Limits {
    fn max_ops() -> usize {
        100
    }

    fn max_bytes() -> usize {
        1_048_576
    }

    fn idempotency_ttl() -> u64 {
        86_400_000
    }

    fn audit_retention_days() -> u64 {
        30
    }

    fn queue_max_retries() -> u32 {
        5
    }

    fn queue_batch_size() -> usize {
        32
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ops: Self::max_ops(),
            max_bytes: Self::max_bytes(),
            idempotency_ttl: Self::idempotency_ttl(),
            audit_retention_days: Self::audit_retention_days(),
            queue_max_retries: Self::queue_max_retries(),
            queue_batch_size: Self::queue_batch_size(),
        }
    }
}
