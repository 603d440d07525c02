//! In-process queue with at-least-once delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use super::event::{Event, QueueMessage};
use super::{Error, Queue};

#[derive(Default)]
struct Inner {
    ready: Mutex<VecDeque<QueueMessage>>,
    in_flight: Mutex<HashMap<String, QueueMessage>>,
    dead: Mutex<Vec<QueueMessage>>,
    notify: Notify,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.inner.ready.lock().len()
    }

    pub fn dead_letters(&self) -> Vec<QueueMessage> {
        self.inner.dead.lock().clone()
    }

    fn pop(&self, max: usize) -> Vec<QueueMessage> {
        let mut ready = self.inner.ready.lock();
        let mut in_flight = self.inner.in_flight.lock();
        let mut out = vec![];
        while out.len() < max {
            match ready.pop_front() {
                Some(message) => {
                    in_flight.insert(message.id.clone(), message.clone());
                    out.push(message);
                }
                None => break,
            }
        }
        out
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, event: Event) -> Result<(), Error> {
        self.inner.ready.lock().push_back(QueueMessage::new(event));
        self.inner.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, Error> {
        let messages = self.pop(max);
        if !messages.is_empty() {
            return Ok(messages);
        }

        let _ = timeout(wait, self.inner.notify.notified()).await;
        Ok(self.pop(max))
    }

    async fn ack(&self, id: &str) -> Result<(), Error> {
        self.inner.in_flight.lock().remove(id);
        Ok(())
    }

    async fn retry(&self, mut message: QueueMessage, delay: Duration) -> Result<(), Error> {
        self.inner.in_flight.lock().remove(&message.id);
        message.attempts += 1;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if delay > Duration::ZERO {
                sleep(delay).await;
            }
            inner.ready.lock().push_back(message);
            inner.notify.notify_one();
        });
        Ok(())
    }

    async fn dead_letter(&self, message: QueueMessage) -> Result<(), Error> {
        self.inner.in_flight.lock().remove(&message.id);
        self.inner.dead.lock().push(message);
        Ok(())
    }
}
