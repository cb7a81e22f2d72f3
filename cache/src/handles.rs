use crate::builder::Params;
use crate::entry::CacheEntry;
use crate::error::{GetError, RefreshError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::shared::CacheShared;
use crate::EvictionReason;

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A thread-safe, size-bounded, read-through cache.
///
/// `Cache` is a cheap handle: clones share the same underlying cache, and
/// the background threads stop once the last handle is dropped.
#[derive(Debug)]
pub struct Cache<K: Send, V: Send + Sync, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K: Send, V: Send + Sync, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Looks up `key`, loading it on a miss.
  ///
  /// - A fresh hit returns the cached value and marks the entry as used.
  /// - A stale hit still returns the cached value. With graceful refresh
  ///   running the key is queued for a background reload (at most once until
  ///   that reload completes); otherwise the entry is removed.
  /// - A hit on an entry whose background refresh failed returns
  ///   [`GetError::Refresh`] and removes the entry.
  /// - A miss calls the loader, if there is one, and caches the result.
  ///   Without a loader a miss is `Ok(None)`.
  ///
  /// `Ok(None)` from a loaded or cached entry means the source has no value
  /// for this key.
  pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, GetError<V>> {
    match self.shared.store.get(key) {
      Some(entry) => self.shared.on_hit(key, entry),
      None => self.shared.on_miss(key),
    }
  }

  /// Inserts or replaces the value for `key`.
  ///
  /// Adding a new key to a full cache first evicts an approximately least
  /// recently used entry. Replacing an entry discards any refresh state it
  /// had.
  pub fn set(&self, key: K, value: V) {
    let entry = CacheEntry::new(Some(Arc::new(value)), self.shared.params.expire_after_write);
    self.shared.insert(key, Arc::new(entry));
  }

  /// Removes `key` from the cache. Returns `true` if it was present.
  pub fn invalidate(&self, key: &K) -> bool {
    match self.shared.store.delete(key) {
      Some(entry) => {
        Metrics::incr(&self.shared.metrics.invalidations);
        self
          .shared
          .notify(key.clone(), entry.value(), EvictionReason::Invalidated);
        true
      }
      None => false,
    }
  }

  /// Turns the calling thread into an additional refresh worker.
  ///
  /// Blocks until [`stop_refresh`](Self::stop_refresh) is called and the
  /// keys already queued have been processed.
  pub fn run_refresh(&self) -> Result<(), RefreshError> {
    match &self.shared.refresh {
      Some(pipeline) => pipeline.run(),
      None => Err(RefreshError::NotEnabled),
    }
  }

  /// Stops background refresh. Idempotent.
  ///
  /// Workers finish the keys already queued and exit. From then on stale
  /// entries are removed on read, as if graceful refresh were disabled.
  pub fn stop_refresh(&self) {
    if let Some(pipeline) = &self.shared.refresh {
      pipeline.stop();
    }
  }

  /// Returns the number of keys waiting for a background refresh.
  pub fn pending_refreshes(&self) -> usize {
    self
      .shared
      .refresh
      .as_ref()
      .map_or(0, |pipeline| pipeline.pending())
  }

  /// Returns the number of entries, including negative ones.
  #[inline]
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.shared.store.is_empty()
  }

  /// Iterates over the cached values, shard by shard.
  ///
  /// Negative entries are skipped, and entries are yielded whether or not
  /// they are stale. Reading through the iterator does not count as use.
  pub fn iter(&self) -> impl Iterator<Item = (K, Arc<V>)> + '_ {
    self
      .shared
      .store
      .snapshot()
      .filter_map(|(key, entry)| entry.value().map(|value| (key, value)))
  }

  /// Returns a snapshot of the cache's counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Returns the normalized configuration the cache was built with.
  pub fn params(&self) -> &Params {
    &self.shared.params
  }
}
