//! KV seam. Production deployments sit the gateway on a shared
//! key-value service; [`MemoryKv`] backs tests and single-node runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::Error;

#[derive(Debug, Clone)]
pub struct KvPage {
    pub keys: Vec<String>,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), Error>;

    /// List keys under a prefix, lexicographic, paged by cursor.
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KvPage, Error>;

    /// Compare-and-swap. `expected` of `None` means the key must not
    /// exist. Returns whether the swap happened.
    async fn put_if(
        &self,
        key: &str,
        expected: Option<&Bytes>,
        value: Bytes,
    ) -> Result<bool, Error>;
}

#[derive(Debug, Clone)]
struct Stored {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Stored {
    fn expired(&self) -> bool {
        self.expires_at.map(|at| at <= Instant::now()).unwrap_or(false)
    }
}

/// In-memory KV with TTLs and per-key CAS.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Stored>,
    unavailable: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage. Every operation fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Unavailable("kv offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.check_available()?;
        let expired = match self.entries.get(key) {
            Some(stored) if !stored.expired() => return Ok(Some(stored.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            Stored {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), Error> {
        self.check_available()?;
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KvPage, Error> {
        self.check_available()?;
        let mut keys = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().expired())
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        keys.sort();

        let keys = keys
            .into_iter()
            .filter(|key| cursor.map(|c| key.as_str() > c).unwrap_or(true))
            .take(limit)
            .collect::<Vec<_>>();

        let cursor = if keys.len() == limit {
            keys.last().cloned()
        } else {
            None
        };

        Ok(KvPage { keys, cursor })
    }

    async fn put_if(
        &self,
        key: &str,
        expected: Option<&Bytes>,
        value: Bytes,
    ) -> Result<bool, Error> {
        self.check_available()?;
        let stored = Stored {
            value,
            expires_at: None,
        };

        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let matches = if current.expired() {
                    expected.is_none()
                } else {
                    expected.map(|e| *e == current.value).unwrap_or(false)
                };
                if matches {
                    occupied.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
