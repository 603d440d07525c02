//! Versioned key-value cache with independent freshness and
//! stale-while-revalidate windows.

pub mod entry;
pub mod error;
pub mod key;
pub mod kv;
pub mod store;

pub use entry::{CacheEntry, Freshness};
pub use error::Error;
pub use kv::{Kv, KvPage, MemoryKv};
pub use store::{Cache, CacheStatus};
