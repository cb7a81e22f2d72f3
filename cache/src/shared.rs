use crate::builder::Params;
use crate::entry::CacheEntry;
use crate::error::GetError;
use crate::eviction::EvictionSampler;
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::store::ShardedMap;
use crate::task::notifier::Notifier;
use crate::task::refresh::RefreshPipeline;
use crate::{time, EvictionReason};

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K: Send, V: Send + Sync, H> {
  pub(crate) store: Arc<ShardedMap<K, Arc<CacheEntry<V>>, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) sampler: EvictionSampler<K, V>,
  pub(crate) refresh: Option<RefreshPipeline<K, V, H>>,
  pub(crate) loader: Option<Arc<dyn Loader<K, V>>>,
  pub(crate) notifier: Option<Notifier<K, V>>,
  pub(crate) params: Params,
}

impl<K: Send, V: Send + Sync, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("params", &self.params)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K: Send, V: Send + Sync, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    // Dropping the pipeline closes the refresh queue.
    self.refresh.take();
    if let Some(notifier) = self.notifier.take() {
      notifier.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Read path for a key that is present in the map.
  pub(crate) fn on_hit(&self, key: &K, entry: Arc<CacheEntry<V>>) -> Result<Option<Arc<V>>, GetError<V>> {
    Metrics::incr(&self.metrics.hits);

    // A failed refresh is reported once; the entry goes with it.
    if let Some(error) = entry.refresh_error() {
      let error = error.clone();
      if self.remove_exact(key, &entry).is_some() {
        self.notify(key.clone(), entry.value(), EvictionReason::RefreshFailed);
      }
      return Err(GetError::Refresh {
        stale: entry.value(),
        source: error,
      });
    }

    if !entry.is_stale(time::now_nanos(), self.params.expire_after_read) {
      entry.touch();
      return Ok(entry.value());
    }

    match &self.refresh {
      // Serving a stale entry while it reloads counts as a use.
      Some(pipeline) if pipeline.is_active() => {
        if !entry.try_begin_refresh() {
          entry.touch();
        } else if pipeline.enqueue(key.clone()) {
          Metrics::incr(&self.metrics.refreshes_queued);
          tracing::trace!("stale entry queued for refresh");
          entry.touch();
        } else {
          entry.abandon_refresh();
          self.expire(key, &entry);
        }
      }
      _ => self.expire(key, &entry),
    }

    Ok(entry.value())
  }

  /// Read path for a key that is absent from the map.
  pub(crate) fn on_miss(&self, key: &K) -> Result<Option<Arc<V>>, GetError<V>> {
    Metrics::incr(&self.metrics.misses);
    let Some(loader) = &self.loader else {
      return Ok(None);
    };

    Metrics::incr(&self.metrics.loads);
    let value = match loader.load(key) {
      Ok(value) => value.map(Arc::new),
      Err(error) => {
        Metrics::incr(&self.metrics.load_failures);
        tracing::debug!(%error, "load on miss failed");
        return Err(GetError::Load(error));
      }
    };

    let entry = CacheEntry::new(value.clone(), self.params.expire_after_write);
    self.insert(key.clone(), Arc::new(entry));
    Ok(value)
  }

  /// Stores `entry` under `key`, making room first if `key` is new and the
  /// cache is full.
  ///
  /// Concurrent inserts of new keys can all pass the pre-insert check before
  /// any of them lands, so each new key trims the overshoot again afterwards.
  /// Once inserts settle the count is back within `maximum_entries`.
  pub(crate) fn insert(&self, key: K, entry: Arc<CacheEntry<V>>) {
    let maximum = self.params.maximum_entries;
    if !self.store.contains_key(&key) {
      while self.store.len() >= maximum {
        if !self.evict_one() {
          break;
        }
      }
    }

    match self.store.set(key, entry) {
      Some(_) => Metrics::incr(&self.metrics.updates),
      None => {
        Metrics::incr(&self.metrics.inserts);
        while self.store.len() > maximum {
          if !self.evict_one() {
            break;
          }
        }
      }
    }
  }

  /// Removes one sampled LRU entry. Returns `false` if nothing was evicted.
  fn evict_one(&self) -> bool {
    match self.sampler.evict(&self.store) {
      Some((key, entry)) => {
        Metrics::incr(&self.metrics.evicted_by_capacity);
        self.notify(key, entry.value(), EvictionReason::Capacity);
        true
      }
      None => false,
    }
  }

  /// Removes `key` only while it still maps to `entry`.
  fn remove_exact(&self, key: &K, entry: &Arc<CacheEntry<V>>) -> Option<Arc<CacheEntry<V>>> {
    self.store.delete_if(key, |current| Arc::ptr_eq(current, entry))
  }

  fn expire(&self, key: &K, entry: &Arc<CacheEntry<V>>) {
    if self.remove_exact(key, entry).is_some() {
      Metrics::incr(&self.metrics.expired);
      self.notify(key.clone(), entry.value(), EvictionReason::Expired);
    }
  }

  pub(crate) fn notify(&self, key: K, value: Option<Arc<V>>, reason: EvictionReason) {
    if let Some(notifier) = &self.notifier {
      notifier.notify(key, value, reason);
    }
  }
}
