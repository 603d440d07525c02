//! Asynchronous event bus carrying cache invalidations from the write
//! path to every gateway instance.

pub mod consumer;
pub mod event;
pub mod memory;

pub use consumer::InvalidationConsumer;
pub use event::{Event, QueueMessage};
pub use memory::MemoryQueue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn send(&self, event: Event) -> Result<(), Error>;

    /// Receive up to `max` messages, waiting up to `wait` for the
    /// first one. Messages stay in flight until acked, retried or
    /// dead-lettered.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, Error>;

    async fn ack(&self, id: &str) -> Result<(), Error>;

    /// Redeliver after a delay, with the attempt count bumped.
    async fn retry(&self, message: QueueMessage, delay: Duration) -> Result<(), Error>;

    async fn dead_letter(&self, message: QueueMessage) -> Result<(), Error>;
}
