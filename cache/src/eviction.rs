//! Approximate LRU eviction by sampling.
//!
//! Rather than keeping a global recency order in sync with every access, the
//! sampler draws a handful of random entries per eviction into a small pool
//! of candidates and evicts the least recently used one it has seen. The
//! pool persists between evictions, so good candidates found by earlier
//! passes are remembered. This is the "eviction pool" technique popularised
//! by Redis.

use crate::entry::CacheEntry;
use crate::store::ShardedMap;

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::Mutex;

type Candidate<K, V> = (K, Arc<CacheEntry<V>>);

/// A bounded set of eviction candidates.
///
/// Invariant: `slots.len() <= capacity`. Once full, the pool only ever trades
/// its most recently used occupant for an older sample, so it converges on
/// the oldest entries seen so far.
#[derive(Debug)]
pub(crate) struct EvictionPool<K, V> {
  slots: Vec<Candidate<K, V>>,
  capacity: usize,
}

impl<K: Eq, V> EvictionPool<K, V> {
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      slots: Vec::with_capacity(capacity),
      capacity,
    }
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.slots.len()
  }

  /// Offers a sampled entry to the pool.
  ///
  /// A key already in the pool has its entry refreshed in place. With free
  /// capacity the sample is added. Otherwise it replaces the occupant with the
  /// newest `last_used`, but only if that occupant is strictly newer than the
  /// sample; ties keep the occupant.
  pub(crate) fn offer(&mut self, key: K, entry: Arc<CacheEntry<V>>) {
    if let Some(slot) = self.slots.iter_mut().find(|(pooled, _)| *pooled == key) {
      slot.1 = entry;
      return;
    }

    if self.slots.len() < self.capacity {
      self.slots.push((key, entry));
      return;
    }

    let mut newest: Option<(usize, u64)> = None;
    for (idx, (_, pooled)) in self.slots.iter().enumerate() {
      let used = pooled.last_used();
      if newest.map_or(true, |(_, best)| used > best) {
        newest = Some((idx, used));
      }
    }

    if let Some((idx, used)) = newest {
      if used > entry.last_used() {
        self.slots[idx] = (key, entry);
      }
    }
  }

  /// Removes and returns the occupant with the oldest `last_used`.
  ///
  /// The first of several equally old occupants wins. The vacated slot is
  /// filled from the tail of the pool.
  pub(crate) fn take_oldest(&mut self) -> Option<Candidate<K, V>> {
    let mut oldest: Option<(usize, u64)> = None;
    for (idx, (_, pooled)) in self.slots.iter().enumerate() {
      let used = pooled.last_used();
      if oldest.map_or(true, |(_, best)| used < best) {
        oldest = Some((idx, used));
      }
    }

    oldest.map(|(idx, _)| self.slots.swap_remove(idx))
  }
}

/// Picks and removes near-least-recently-used entries from a [`ShardedMap`].
#[derive(Debug)]
pub(crate) struct EvictionSampler<K, V> {
  pool: Mutex<EvictionPool<K, V>>,
  sample_size: usize,
}

impl<K, V> EvictionSampler<K, V>
where
  K: Eq + Hash + Clone,
{
  /// `sample_size` is clamped to `pool_size`.
  pub(crate) fn new(pool_size: usize, sample_size: usize) -> Self {
    let pool_size = pool_size.max(1);
    Self {
      pool: Mutex::new(EvictionPool::new(pool_size)),
      sample_size: sample_size.clamp(1, pool_size),
    }
  }

  /// Removes one entry from `map`, the best estimate of the least recently
  /// used, and returns it. Does nothing on an empty map.
  ///
  /// Pool occupants whose map entry has since been replaced or removed are
  /// discarded without evicting anything in their place; if the pool runs dry
  /// that way, one more sample pass is made.
  pub(crate) fn evict<H>(&self, map: &ShardedMap<K, Arc<CacheEntry<V>>, H>) -> Option<Candidate<K, V>>
  where
    H: BuildHasher + Clone,
  {
    // Evictions are serialized on the pool lock.
    let mut pool = self.pool.lock();
    let mut rng = rand::rng();

    for _pass in 0..2 {
      if map.is_empty() {
        return None;
      }

      for (key, entry) in map.sample(self.sample_size, &mut rng) {
        pool.offer(key, entry);
      }

      while let Some((key, entry)) = pool.take_oldest() {
        let removed = map.delete_if(&key, |current| Arc::ptr_eq(current, &entry));
        if let Some(removed) = removed {
          tracing::trace!(pool = pool.len(), "evicted sampled LRU entry");
          return Some((key, removed));
        }
      }
    }

    None
  }
}
