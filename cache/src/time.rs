use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all timestamps kept by the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds elapsed since the cache epoch.
///
/// Entries store their timestamps as `u64` nanoseconds so they fit in an
/// `AtomicU64` and can be updated without holding a shard lock.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  Instant::now()
    .saturating_duration_since(*CACHE_EPOCH)
    .as_nanos() as u64
}

/// Converts a configured duration into nanoseconds, saturating on overflow.
#[inline]
pub(crate) fn duration_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
