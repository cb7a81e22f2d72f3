use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Lock-free counters shared by the read path and the refresh workers.
#[derive(Debug)]
pub(crate) struct Metrics {
  // Lookups
  pub(crate) hits: Counter,
  pub(crate) misses: Counter,
  pub(crate) loads: Counter,
  pub(crate) load_failures: Counter,

  // Writes and removals
  pub(crate) inserts: Counter,
  pub(crate) updates: Counter,
  pub(crate) invalidations: Counter,
  pub(crate) evicted_by_capacity: Counter,
  pub(crate) expired: Counter,

  // Background refresh
  pub(crate) refreshes_queued: Counter,
  pub(crate) refreshes: Counter,
  pub(crate) refresh_failures: Counter,
  pub(crate) refresh_missing: Counter,

  created_at: Instant,
}

type Counter = CachePadded<AtomicU64>;

fn counter() -> Counter {
  CachePadded::new(AtomicU64::new(0))
}

#[inline]
fn read(counter: &Counter) -> u64 {
  counter.load(Ordering::Relaxed)
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self {
      hits: counter(),
      misses: counter(),
      loads: counter(),
      load_failures: counter(),
      inserts: counter(),
      updates: counter(),
      invalidations: counter(),
      evicted_by_capacity: counter(),
      expired: counter(),
      refreshes_queued: counter(),
      refreshes: counter(),
      refresh_failures: counter(),
      refresh_missing: counter(),
      created_at: Instant::now(),
    }
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Reads every counter. Counters are read one at a time, so the snapshot
  /// is not atomic across them.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = read(&self.hits);
    let misses = read(&self.misses);
    let lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if lookups > 0 { hits as f64 / lookups as f64 } else { 0.0 },
      loads: read(&self.loads),
      load_failures: read(&self.load_failures),
      inserts: read(&self.inserts),
      updates: read(&self.updates),
      invalidations: read(&self.invalidations),
      evicted_by_capacity: read(&self.evicted_by_capacity),
      expired: read(&self.expired),
      refreshes_queued: read(&self.refreshes_queued),
      refreshes: read(&self.refreshes),
      refresh_failures: read(&self.refresh_failures),
      refresh_missing: read(&self.refresh_missing),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// Counter values read from a running cache by [`Cache::metrics`](crate::Cache::metrics).
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Reads that found an entry (fresh or stale).
  pub hits: u64,
  /// Reads that found nothing and fell through to the loader, if any.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Synchronous loads performed on a miss.
  pub loads: u64,
  /// Synchronous loads that returned an error.
  pub load_failures: u64,
  /// Keys added to the cache.
  pub inserts: u64,
  /// Writes that replaced an existing entry.
  pub updates: u64,
  /// Manual invalidations that removed an entry.
  pub invalidations: u64,
  /// Entries removed by sampled LRU eviction.
  pub evicted_by_capacity: u64,
  /// Stale entries deleted on read because graceful refresh was unavailable.
  pub expired: u64,
  /// Keys handed to the refresh queue.
  pub refreshes_queued: u64,
  /// Background reloads that replaced an entry's value.
  pub refreshes: u64,
  /// Background reloads that failed and marked their entry.
  pub refresh_failures: u64,
  /// Queued keys whose entry was gone by the time a worker got to them.
  pub refresh_missing: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let hit_ratio = format!("{:.2}%", self.hit_ratio * 100.0);
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &hit_ratio)
      .field("loads", &self.loads)
      .field("load_failures", &self.load_failures)
      .field("inserts", &self.inserts)
      .field("updates", &self.updates)
      .field("invalidations", &self.invalidations)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("expired", &self.expired)
      .field("refreshes_queued", &self.refreshes_queued)
      .field("refreshes", &self.refreshes)
      .field("refresh_failures", &self.refresh_failures)
      .field("refresh_missing", &self.refresh_missing)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
