use crate::error::LoadError;
use crate::time;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The record held in the map for one key.
///
/// Entries are shared as `Arc<CacheEntry<V>>` between the owning shard, the
/// readers that cloned it out and the refresh worker. The value, the write
/// deadline and the refresh error never change after construction: a write,
/// a completed refresh or a failed refresh builds a new entry and swaps it
/// into the shard under its write lock. Only the recency timestamp and the
/// in-flight refresh flag are mutated in place, and both are atomics.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The cached value. `None` is a negative entry: the loader reported the
  /// key as absent at load time.
  value: Option<Arc<V>>,
  /// Write deadline in nanoseconds since the cache epoch. 0 means none.
  expires_at: u64,
  /// Last successful read or write, in nanoseconds since the cache epoch.
  last_used: AtomicU64,
  /// True while a reload for this key is queued or in flight.
  refreshing: AtomicBool,
  /// The failure of the last background refresh, if any.
  refresh_error: Option<LoadError>,
}

impl<V> CacheEntry<V> {
  /// Creates a fresh entry stamped with the current time.
  pub(crate) fn new(value: Option<Arc<V>>, expire_after_write: Option<Duration>) -> Self {
    let now = time::now_nanos();
    let expires_at = expire_after_write.map_or(0, |ttl| {
      now.saturating_add(time::duration_nanos(ttl)).max(1)
    });

    Self {
      value,
      expires_at,
      last_used: AtomicU64::new(now),
      refreshing: AtomicBool::new(false),
      refresh_error: None,
    }
  }

  /// Builds the replacement for this entry after its background refresh failed.
  ///
  /// The value and timestamps are carried over and the entry stays marked as
  /// refreshing, so no further reload is queued before a reader removes it.
  pub(crate) fn failed_refresh(&self, error: LoadError) -> Self {
    Self {
      value: self.value.clone(),
      expires_at: self.expires_at,
      last_used: AtomicU64::new(self.last_used()),
      refreshing: AtomicBool::new(true),
      refresh_error: Some(error),
    }
  }

  #[inline]
  pub(crate) fn value(&self) -> Option<Arc<V>> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn has_value(&self) -> bool {
    self.value.is_some()
  }

  #[inline]
  pub(crate) fn refresh_error(&self) -> Option<&LoadError> {
    self.refresh_error.as_ref()
  }

  #[inline]
  pub(crate) fn last_used(&self) -> u64 {
    self.last_used.load(Ordering::Relaxed)
  }

  /// Records a read. This is a cheap atomic store.
  #[inline]
  pub(crate) fn touch(&self) {
    self.last_used.store(time::now_nanos(), Ordering::Relaxed);
  }

  #[cfg(test)]
  pub(crate) fn set_last_used(&self, nanos: u64) {
    self.last_used.store(nanos, Ordering::Relaxed);
  }

  /// Checks whether the entry is stale at `now_nanos`.
  ///
  /// An entry is stale at or after its write deadline, or once it has gone
  /// `expire_after_read` without being used.
  #[inline]
  pub(crate) fn is_stale(&self, now_nanos: u64, expire_after_read: Option<Duration>) -> bool {
    if self.expires_at > 0 && now_nanos >= self.expires_at {
      return true;
    }

    if let Some(idle) = expire_after_read {
      let idle_deadline = self.last_used().saturating_add(time::duration_nanos(idle));
      if now_nanos >= idle_deadline {
        return true;
      }
    }

    false
  }

  #[inline]
  pub(crate) fn is_refreshing(&self) -> bool {
    self.refreshing.load(Ordering::Acquire)
  }

  /// Claims the refresh for this entry.
  ///
  /// Returns `true` for exactly one caller per entry until the flag is
  /// released, which is what keeps a key in the refresh queue at most once.
  #[inline]
  pub(crate) fn try_begin_refresh(&self) -> bool {
    self
      .refreshing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Releases a refresh claim that could not be queued.
  #[inline]
  pub(crate) fn abandon_refresh(&self) {
    self.refreshing.store(false, Ordering::Release);
  }
}
