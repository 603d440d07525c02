//! Shard-facing half of the gateway: the shard actor client,
//! transports, retries and the per-shard circuit breaker.

pub mod breaker;
pub mod client;
pub mod error;
pub mod retry;
pub mod shard;

pub use breaker::{Breaker, Breakers};
pub use client::ShardClient;
pub use error::Error;
pub use retry::Backoff;
pub use shard::{
    EventKind, ExecuteResult, ExportPage, HttpShard, MemoryShard, MutationEvent, Param, Row,
    ShardId, ShardTransport, Statement,
};
