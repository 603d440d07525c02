//! Classification cache. Statements repeat heavily in OLTP traffic;
//! one LRU keyed by the statement text avoids rescanning.

use std::num::NonZeroUsize;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{classify, Classification};
use crate::config::config;

static CACHE: Lazy<Mutex<LruCache<String, Classification>>> = Lazy::new(|| {
    let capacity = config().general.classifier_cache_size.max(1);
    Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap()))
});

pub fn classify_cached(sql: &str) -> Classification {
    let mut cache = CACHE.lock();
    if let Some(classification) = cache.get(sql) {
        return classification.clone();
    }

    let classification = classify(sql);
    cache.put(sql.to_string(), classification.clone());
    classification
}
