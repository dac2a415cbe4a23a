//! Bounded concurrent cache
//!
//! The memoization primitive behind the resolver and the assignability
//! engine: an access-ordered map with a hard bound, single-flight
//! compute-if-absent and weakly consistent hit/miss statistics. Lookups that
//! hit are served under a read lock; misses serialize on one per-cache
//! compute lock so a producer runs at most once per key even under
//! contention.

use crate::config::CacheConfig;
use crate::error::Result;
use ahash::RandomState;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::trace;

/// Weakly consistent hit/miss snapshot.
///
/// The two counters are read independently; a snapshot taken while other
/// threads are resolving may be off by in-flight operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, `0.0` when no lookups completed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU cache with single-flight computation.
///
/// Values are stored verbatim, so a `V = Option<_>` stored as `None` is a
/// present entry, distinguishable from an absent key.
///
/// # Examples
///
/// ```rust
/// use wirecore::cache::Cache;
///
/// let cache: Cache<String, usize> = Cache::new(128);
/// let v = cache.compute_if_absent("answer".into(), || 42);
/// assert_eq!(v, 42);
/// assert_eq!(cache.hit_count(), 0);
/// assert_eq!(cache.miss_count(), 1);
///
/// // Second lookup is a hit; the producer does not run again.
/// let v = cache.compute_if_absent("answer".into(), || unreachable!());
/// assert_eq!(v, 42);
/// assert_eq!(cache.hit_count(), 1);
/// ```
pub struct Cache<K, V> {
    /// Access-ordered storage. Evicted down to `max_size` after each
    /// insertion, so `max_size + 1` entries exist transiently.
    inner: RwLock<LruCache<K, V, RandomState>>,
    /// Serializes all misses; producers run while holding this lock but
    /// never while holding the map lock, so readers stay unblocked.
    compute: Mutex<()>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache bounded to `max_size` entries with default sizing
    /// hints.
    ///
    /// # Panics
    ///
    /// Panics when `max_size` is zero; use [`Cache::with_config`] for
    /// validated construction.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "cache bound must be positive");
        Self {
            inner: RwLock::new(LruCache::unbounded_with_hasher(RandomState::new())),
            compute: Mutex::new(()),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from a validated [`CacheConfig`].
    ///
    /// Invalid parameters fail with a domain error. The capacity and
    /// load-factor hints are validated for configuration compatibility; the
    /// backing map grows on demand.
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.max_size))
    }

    /// Return the cached value for `key`, or run `producer` to fill it.
    ///
    /// At most one caller runs the producer for a given key; concurrent
    /// callers for the same key block until the value is published.
    pub fn compute_if_absent<F>(&self, key: K, producer: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.try_compute_if_absent(key, || Ok::<V, std::convert::Infallible>(producer())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`Cache::compute_if_absent`].
    ///
    /// Producer errors propagate unchanged; the miss is still counted and
    /// nothing is stored, so a later call retries the producer.
    pub fn try_compute_if_absent<F, E>(&self, key: K, producer: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        // Fast path: read-locked existence check, no compute lock.
        if self.inner.read().peek(&key).is_some() {
            // Promote recency under the write lock; the entry may have been
            // evicted in between, in which case this falls through to the
            // miss path.
            if let Some(value) = self.inner.write().get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value.clone());
            }
        }

        let _compute = self.compute.lock();

        // Double-check: another thread may have produced the value while we
        // waited on the compute lock.
        if let Some(value) = self.inner.write().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = producer()?;

        let mut map = self.inner.write();
        map.put(key, value.clone());
        while map.len() > self.max_size {
            let evicted = map.pop_lru();
            debug_assert!(evicted.is_some());

            #[cfg(feature = "logging")]
            trace!(
                target: "wirecore",
                size = map.len(),
                max_size = self.max_size,
                "Cache bound reached, evicted least-recently-used entry"
            );
        }

        Ok(value)
    }

    /// Remove `key` if present. Statistics are preserved.
    pub fn invalidate(&self, key: &K) {
        self.inner.write().pop(key);
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn invalidate_all<P>(&self, predicate: P)
    where
        P: Fn(&K) -> bool,
    {
        let mut map = self.inner.write();
        let doomed: Vec<K> = map
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            map.pop(&key);
        }
    }

    /// Empty the cache. Statistics are preserved.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Current entry count.
    pub fn size(&self) -> usize {
        self.inner.read().len()
    }

    /// Completed lookups served from the cache.
    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Completed lookups that ran (or attempted) the producer.
    #[inline]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// `hits / (hits + misses)` as a weakly consistent snapshot.
    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }

    /// Snapshot of both counters. Weakly consistent: the two loads are not
    /// performed atomically together.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("size", &self.inner.read().len())
            .field("max_size", &self.max_size)
            .field("hits", &self.hit_count())
            .field("misses", &self.miss_count())
            .finish()
    }
}
