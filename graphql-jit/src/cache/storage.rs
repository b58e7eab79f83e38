use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

pub(crate) trait KeyType: Clone + fmt::Debug + Hash + Eq + Send + Sync {}
pub(crate) trait ValueType: Clone + Send + Sync {}

// Blanket implementation which satisfies the compiler
impl<K> KeyType for K
where
    K: Clone + fmt::Debug + Hash + Eq + Send + Sync,
{
    // Nothing to implement, since K already supports the other traits.
    // It has the functions it needs already
}

// Blanket implementation which satisfies the compiler
impl<V> ValueType for V
where
    V: Clone + Send + Sync,
{
    // Nothing to implement, since V already supports the other traits.
    // It has the functions it needs already
}

/// Counters of a compile cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently stored.
    pub size: usize,
    /// Maximum number of entries, `0` when caching is disabled.
    pub capacity: usize,
    /// Lookups answered from storage.
    pub hits: u64,
    /// Lookups that found nothing, expired entries included.
    pub misses: u64,
    /// Entries dropped because they outlived the configured time to live.
    pub expirations: u64,
    /// Entries dropped to make room for newer ones.
    pub evictions: u64,
}

impl CacheStats {
    /// Share of lookups answered from storage, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In memory LRU storage. A capacity of `0` stores nothing.
///
/// With a time to live, entries older than it are dropped when looked up.
#[derive(Clone)]
pub(crate) struct CacheStorage<K: KeyType, V: ValueType> {
    inner: Option<Arc<Mutex<LruCache<K, (Instant, V)>>>>,
    capacity: usize,
    ttl: Option<Duration>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    expirations: Arc<AtomicU64>,
}

impl<K, V> CacheStorage<K, V>
where
    K: KeyType,
    V: ValueType,
{
    pub(crate) fn new(max_capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: NonZeroUsize::new(max_capacity).map(|c| Arc::new(Mutex::new(LruCache::new(c)))),
            capacity: max_capacity,
            ttl,
            hits: Default::default(),
            misses: Default::default(),
            evictions: Default::default(),
            expirations: Default::default(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let found = self.inner.as_ref().and_then(|inner| {
            let mut inner = inner.lock();
            let (inserted, value) = inner.get(key)?;
            if self.ttl.is_some_and(|ttl| inserted.elapsed() >= ttl) {
                tracing::trace!(key = ?key, "expired from the compile cache");
                inner.pop(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(value.clone())
        });
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        let Some(inner) = &self.inner else {
            return;
        };
        let inserted = key.clone();
        if let Some((previous, _)) = inner.lock().push(key, (Instant::now(), value)) {
            if previous != inserted {
                tracing::trace!(key = ?previous, "evicted from the compile cache");
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.as_ref().map(|inner| inner.lock().len()).unwrap_or(0)
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
