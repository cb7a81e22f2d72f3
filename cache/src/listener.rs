use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// The entry was chosen by the sampled LRU eviction to make room.
  Capacity,
  /// The entry went stale while graceful refresh was unavailable.
  Expired,
  /// The entry was manually invalidated.
  Invalidated,
  /// The entry's background refresh failed and a reader collected the error.
  RefreshFailed,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Expired => write!(f, "evicted due to expiration"),
      EvictionReason::Invalidated => write!(f, "manually invalidated"),
      EvictionReason::RefreshFailed => write!(f, "removed after a failed refresh"),
    }
  }
}

/// A listener that can be registered with the cache to receive notifications
/// when entries are removed.
///
/// `on_evict` receives the key, the value (`None` for a negative entry) and
/// the reason. It runs on a dedicated background thread so it never blocks
/// cache operations; notifications are dropped if that thread falls too far
/// behind.
pub trait EvictionListener<K, V>: Send + Sync {
  fn on_evict(&self, key: K, value: Option<Arc<V>>, reason: EvictionReason);
}
