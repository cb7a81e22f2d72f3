use crate::entry::CacheEntry;
use crate::error::BuildError;
use crate::eviction::EvictionSampler;
use crate::handles::Cache;
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::store::ShardedMap;
use crate::task::notifier::Notifier;
use crate::task::refresh::{RefreshContext, RefreshPipeline};
use crate::EvictionListener;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Maximum entry count used when none is configured.
pub const DEFAULT_MAXIMUM_ENTRIES: usize = 4096;
/// Smallest eviction pool; anything smaller makes sampling pointless.
pub const MIN_EVICTION_POOL_SIZE: usize = 8;
/// Entries sampled per eviction when none is configured.
pub const DEFAULT_EVICTION_SAMPLE_SIZE: usize = 5;
/// Smallest (and default) number of shards.
pub const MIN_SHARDS: usize = 16;
/// Capacity of the refresh queue when none is configured.
pub const DEFAULT_REFRESH_QUEUE_CAPACITY: usize = 32;

/// How a cache is configured.
///
/// Every field has a usable default, and [`Params::normalized`] corrects
/// values that are unset or too small rather than rejecting them. With the
/// `serde` feature this can be embedded in an application's own
/// configuration file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Params {
  /// Upper bound on the number of entries. 0 means the default of 4096.
  pub maximum_entries: usize,
  /// Entries go stale this long after they were written or reloaded.
  pub expire_after_write: Option<Duration>,
  /// Entries go stale once they have not been used for this long.
  pub expire_after_read: Option<Duration>,
  /// Capacity of the eviction candidate pool. At least 8, and at least
  /// `eviction_sample_size`.
  pub eviction_pool_size: usize,
  /// Entries sampled per eviction. 0 means the default of 5.
  pub eviction_sample_size: usize,
  /// Number of map shards. At least 16.
  pub num_shards: usize,
  /// Serve stale entries while reloading them in the background instead of
  /// dropping them.
  pub graceful_refresh: bool,
  /// Background refresh workers started with the cache.
  pub refresh_workers: usize,
  /// Capacity of the refresh queue; enqueuing blocks when it is full.
  pub refresh_queue_capacity: usize,
}

impl Default for Params {
  fn default() -> Self {
    Self {
      maximum_entries: DEFAULT_MAXIMUM_ENTRIES,
      expire_after_write: None,
      expire_after_read: None,
      eviction_pool_size: MIN_EVICTION_POOL_SIZE,
      eviction_sample_size: DEFAULT_EVICTION_SAMPLE_SIZE,
      num_shards: MIN_SHARDS,
      graceful_refresh: false,
      refresh_workers: 1,
      refresh_queue_capacity: DEFAULT_REFRESH_QUEUE_CAPACITY,
    }
  }
}

impl Params {
  /// Applies defaults to unset values and raises undersized ones.
  pub fn normalized(mut self) -> Self {
    if self.maximum_entries == 0 {
      self.maximum_entries = DEFAULT_MAXIMUM_ENTRIES;
    }
    if self.eviction_sample_size == 0 {
      self.eviction_sample_size = DEFAULT_EVICTION_SAMPLE_SIZE;
    }
    // No sense in sampling more than fits in the pool.
    self.eviction_pool_size = self
      .eviction_pool_size
      .max(MIN_EVICTION_POOL_SIZE)
      .max(self.eviction_sample_size);
    self.num_shards = self.num_shards.max(MIN_SHARDS);
    self.refresh_workers = self.refresh_workers.max(1);
    if self.refresh_queue_capacity == 0 {
      self.refresh_queue_capacity = DEFAULT_REFRESH_QUEUE_CAPACITY;
    }
    self
  }
}

/// A builder for creating [`Cache`] instances.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  params: Params,
  hasher: H,
  loader: Option<Arc<dyn Loader<K, V>>>,
  listener: Option<Arc<dyn EvictionListener<K, V>>>,
  _marker: PhantomData<fn(K) -> V>,
}

impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("params", &self.params)
      .field("has_loader", &self.loader.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Replaces the whole configuration.
  pub fn params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  /// Sets the maximum number of entries.
  pub fn maximum_entries(mut self, maximum_entries: usize) -> Self {
    self.params.maximum_entries = maximum_entries;
    self
  }

  /// Entries go stale `duration` after being written or reloaded.
  pub fn expire_after_write(mut self, duration: Duration) -> Self {
    self.params.expire_after_write = Some(duration);
    self
  }

  /// Entries go stale once unused for `duration`.
  pub fn expire_after_read(mut self, duration: Duration) -> Self {
    self.params.expire_after_read = Some(duration);
    self
  }

  pub fn eviction_pool_size(mut self, size: usize) -> Self {
    self.params.eviction_pool_size = size;
    self
  }

  pub fn eviction_sample_size(mut self, size: usize) -> Self {
    self.params.eviction_sample_size = size;
    self
  }

  /// Sets the number of concurrent shards.
  pub fn shards(mut self, shards: usize) -> Self {
    self.params.num_shards = shards;
    self
  }

  /// Enables or disables serving stale entries while they reload in the
  /// background.
  pub fn graceful_refresh(mut self, enabled: bool) -> Self {
    self.params.graceful_refresh = enabled;
    self
  }

  /// Sets how many background refresh workers the cache starts.
  pub fn refresh_workers(mut self, workers: usize) -> Self {
    self.params.refresh_workers = workers;
    self
  }

  /// Sets the capacity of the refresh queue.
  pub fn refresh_queue_capacity(mut self, capacity: usize) -> Self {
    self.params.refresh_queue_capacity = capacity;
    self
  }

  /// Sets the loader called on misses and background refreshes.
  pub fn loader<L>(mut self, loader: L) -> Self
  where
    L: Loader<K, V> + 'static,
  {
    self.loader = Some(Arc::new(loader));
    self
  }

  /// Sets the eviction listener for the cache.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener<K, V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Sets the hasher used to route keys to shards.
  pub fn hasher<H2>(self, hasher: H2) -> CacheBuilder<K, V, H2> {
    CacheBuilder {
      params: self.params,
      hasher,
      loader: self.loader,
      listener: self.listener,
      _marker: PhantomData,
    }
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self::from_params(Params::default())
  }

  /// Creates a builder starting from `params`.
  pub fn from_params(params: Params) -> Self {
    Self {
      params,
      hasher: H::default(),
      loader: None,
      listener: None,
      _marker: PhantomData,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "rapidhash")]
impl<K, V> CacheBuilder<K, V, rapidhash::RapidRandomState> {
  pub fn rapidhash() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache and starts its background threads.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    let params = self.params.normalized();

    let store: Arc<ShardedMap<K, Arc<CacheEntry<V>>, H>> =
      Arc::new(ShardedMap::with_hasher(params.num_shards, self.hasher));
    let metrics = Arc::new(Metrics::new());
    let sampler = EvictionSampler::new(params.eviction_pool_size, params.eviction_sample_size);

    let notifier = match self.listener {
      Some(listener) => Some(Notifier::spawn(listener)?),
      None => None,
    };

    let refresh = if params.graceful_refresh {
      let context = self.loader.as_ref().map(|loader| RefreshContext {
        store: Arc::clone(&store),
        loader: Arc::clone(loader),
        metrics: Arc::clone(&metrics),
        expire_after_write: params.expire_after_write,
      });
      let pipeline = RefreshPipeline::new(params.refresh_queue_capacity, context);
      pipeline.spawn_workers(params.refresh_workers)?;
      Some(pipeline)
    } else {
      None
    };

    tracing::debug!(
      maximum_entries = params.maximum_entries,
      shards = params.num_shards,
      graceful_refresh = params.graceful_refresh,
      "cache built"
    );

    Ok(Cache {
      shared: Arc::new(CacheShared {
        store,
        metrics,
        sampler,
        refresh,
        loader: self.loader,
        notifier,
        params,
      }),
    })
  }
}
