//! Size-bounded LRU cache shared by transform workers within one pipeline
//! invocation.

use std::{
    fmt,
    hash::Hash,
    sync::{Mutex, PoisonError},
};

use lru::LruCache;

/// Default maximum number of cached entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000_000;
/// Default number of least-recently-used entries dropped once the capacity is
/// exceeded.
pub const DEFAULT_EVICT_BATCH: usize = 500;

/// A bounded key/value cache, internally synchronized so pool workers can
/// share one instance without external locking. Contents are advisory only:
/// eviction or loss never corrupts output, it just costs repeated work.
pub struct BoundedCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
    capacity: usize,
    evict_batch: usize,
}

impl<K, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("evict_batch", &self.evict_batch)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// New cache evicting `evict_batch` least-recently-used entries whenever
    /// the entry count exceeds `capacity`. Both bounds are clamped to at
    /// least 1.
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
            evict_batch: evict_batch.max(1),
        }
    }

    /// New cache with the default capacity and eviction batch.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_EVICT_BATCH)
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.lock().get(key).cloned()
    }

    /// Insert `key`, evicting a batch of stale entries if the cache grew past
    /// its capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        inner.put(key, value);
        self.evict_overflow(&mut inner);
    }

    /// Insert `key` only if absent. Returns `true` when the key was inserted,
    /// `false` when it was already present. The check and insert happen under
    /// one lock, so concurrent callers agree on a single winner.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut inner = self.lock();
        if inner.contains(&key) {
            return false;
        }
        inner.put(key, value);
        self.evict_overflow(&mut inner);
        true
    }

    /// Current number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn evict_overflow(&self, inner: &mut LruCache<K, V>) {
        if inner.len() <= self.capacity {
            return;
        }
        for _ in 0..self.evict_batch {
            if inner.pop_lru().is_none() {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, V>> {
        // A poisoned lock only means a worker panicked mid-insert; cache
        // contents stay usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
