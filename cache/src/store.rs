//! A concurrent map partitioned into independently locked shards.

use crate::hash::{hash_key, jump_hash};

use core::fmt;
use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;

type Shard<K, T, H> = CachePadded<RwLock<IndexMap<K, T, H>>>;

/// A map that is partitioned into multiple, independently locked shards.
///
/// A key is routed to its shard by a chunked content hash followed by a
/// jump consistent hash, so it always lives in exactly one shard. Reads take
/// the shard's shared lock and writes its exclusive lock; operations on
/// different shards never contend.
///
/// The entry count is kept in a single padded atomic that is adjusted while
/// the mutating shard's write lock is held. Readers of [`len`](Self::len) may
/// observe it slightly behind concurrent mutations on other shards, but it
/// always converges once mutations settle.
pub struct ShardedMap<K, T, H = ahash::RandomState> {
  shards: Box<[Shard<K, T, H>]>,
  hasher: H,
  len: CachePadded<AtomicUsize>,
}

impl<K, T, H> fmt::Debug for ShardedMap<K, T, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedMap")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len.load(Ordering::Relaxed))
      .finish()
  }
}

impl<K, T> ShardedMap<K, T, ahash::RandomState>
where
  K: Eq + Hash,
{
  /// Creates a map with `num_shards` shards and a randomly seeded hasher.
  pub fn new(num_shards: usize) -> Self {
    Self::with_hasher(num_shards, ahash::RandomState::new())
  }
}

impl<K, T, H> ShardedMap<K, T, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a map with `num_shards` shards (at least one) using `hasher`
  /// for both routing and the per-shard tables.
  pub fn with_hasher(num_shards: usize, hasher: H) -> Self {
    let num_shards = num_shards.max(1);
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard_map = IndexMap::with_hasher(hasher.clone());
      shards.push(CachePadded::new(RwLock::new(shard_map)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      len: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  /// Returns the number of shards.
  #[inline]
  pub fn num_shards(&self) -> usize {
    self.shards.len()
  }

  /// Returns the index of the shard that owns `key`.
  #[inline]
  pub fn shard_index<Q>(&self, key: &Q) -> usize
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    jump_hash(hash_key(&self.hasher, key), self.shards.len())
  }

  #[inline]
  fn shard<Q>(&self, key: &Q) -> &RwLock<IndexMap<K, T, H>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    &self.shards[self.shard_index(key)]
  }

  /// Returns a clone of the value stored for `key`.
  pub fn get<Q>(&self, key: &Q) -> Option<T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    T: Clone,
  {
    self.shard(key).read().get(key).cloned()
  }

  /// Returns `true` if `key` is present.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shard(key).read().contains_key(key)
  }

  /// Inserts or replaces the value for `key`, returning the previous value.
  pub fn set(&self, key: K, value: T) -> Option<T> {
    let mut guard = self.shard(&key).write();
    let previous = guard.insert(key, value);
    if previous.is_none() {
      self.len.fetch_add(1, Ordering::Relaxed);
    }
    previous
  }

  /// Removes `key`, returning the value it held.
  pub fn delete<Q>(&self, key: &Q) -> Option<T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut guard = self.shard(key).write();
    let removed = guard.swap_remove(key);
    if removed.is_some() {
      self.len.fetch_sub(1, Ordering::Relaxed);
    }
    removed
  }

  /// Removes `key` only if `predicate` accepts its current value.
  ///
  /// The check and the removal happen under one exclusive lock, so a value
  /// swapped in by another thread is never removed by mistake.
  pub(crate) fn delete_if<Q, F>(&self, key: &Q, predicate: F) -> Option<T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&T) -> bool,
  {
    let mut guard = self.shard(key).write();
    if !guard.get(key).is_some_and(predicate) {
      return None;
    }
    let removed = guard.swap_remove(key);
    if removed.is_some() {
      self.len.fetch_sub(1, Ordering::Relaxed);
    }
    removed
  }

  /// Replaces the value for an existing `key` with whatever `update` builds
  /// from it, under one exclusive lock. `update` returning `None` leaves the
  /// value untouched. Returns the replaced value.
  pub(crate) fn replace_with<Q, F>(&self, key: &Q, update: F) -> Option<T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&T) -> Option<T>,
  {
    let mut guard = self.shard(key).write();
    let slot = guard.get_mut(key)?;
    let replacement = update(slot)?;
    Some(std::mem::replace(slot, replacement))
  }

  /// Returns the number of entries.
  #[inline]
  pub fn len(&self) -> usize {
    self.len.load(Ordering::Relaxed)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns a lazy, single-pass sequence over all entries.
  ///
  /// Each shard is copied into a buffer under its read lock and the lock is
  /// released before any of its entries are yielded. The result is a
  /// per-shard point-in-time view: shards are captured one after another, not
  /// at a single instant.
  pub fn snapshot(&self) -> Snapshot<'_, K, T, H>
  where
    K: Clone,
    T: Clone,
  {
    Snapshot {
      map: self,
      next_shard: 0,
      buffer: Vec::new().into_iter(),
    }
  }

  /// Draws up to `count` entries by a random walk over the shards.
  ///
  /// The walk starts at a random shard and picks slots by random index
  /// inside each shard it visits. Each pick is one indexed lookup, so the
  /// work depends on `count` and the shard count, never on the size of the
  /// map. When the map holds no more than `count` entries everything is
  /// returned. The same entry may be picked more than once.
  pub(crate) fn sample<R>(&self, count: usize, rng: &mut R) -> Vec<(K, T)>
  where
    K: Clone,
    T: Clone,
    R: Rng,
  {
    if count == 0 {
      return Vec::new();
    }
    if self.len() <= count {
      return self.snapshot().take(count).collect();
    }

    let num_shards = self.shards.len();
    let start = rng.random_range(0..num_shards);
    let mut samples = Vec::with_capacity(count);
    let mut quota = count.div_ceil(num_shards);

    for _pass in 0..2 {
      for step in 0..num_shards {
        let wanted = count - samples.len();
        if wanted == 0 {
          return samples;
        }

        let guard = self.shards[(start + step) % num_shards].read();
        let shard_len = guard.len();
        if shard_len == 0 {
          continue;
        }
        for _ in 0..quota.min(wanted) {
          if let Some((key, value)) = guard.get_index(rng.random_range(0..shard_len)) {
            samples.push((key.clone(), value.clone()));
          }
        }
      }
      // Whatever is still missing may come from any shard on the second pass.
      quota = count;
    }

    samples
  }
}

/// The iterator returned by [`ShardedMap::snapshot`].
pub struct Snapshot<'a, K, T, H> {
  map: &'a ShardedMap<K, T, H>,
  next_shard: usize,
  buffer: std::vec::IntoIter<(K, T)>,
}

impl<'a, K, T, H> Iterator for Snapshot<'a, K, T, H>
where
  K: Clone,
  T: Clone,
{
  type Item = (K, T);

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(item) = self.buffer.next() {
        return Some(item);
      }
      if self.next_shard >= self.map.shards.len() {
        return None;
      }

      let batch: Vec<(K, T)> = {
        let guard = self.map.shards[self.next_shard].read();
        guard
          .iter()
          .map(|(key, value)| (key.clone(), value.clone()))
          .collect()
      }; // Read lock is dropped here.

      self.next_shard += 1;
      self.buffer = batch.into_iter();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use std::collections::HashSet;

  fn seeded_map(num_shards: usize) -> ShardedMap<String, u32> {
    ShardedMap::with_hasher(num_shards, ahash::RandomState::with_seeds(11, 22, 33, 44))
  }

  #[test]
  fn routing_is_stable_for_a_key() {
    let map = seeded_map(16);
    let first = map.shard_index("routing-key");
    for _ in 0..100 {
      assert_eq!(map.shard_index("routing-key"), first);
    }
    assert!(first < 16);
  }

  #[test]
  fn borrowed_lookup_routes_like_owned_key() {
    let map = seeded_map(32);
    let owned = String::from("borrowed");
    map.set(owned.clone(), 5);
    assert_eq!(map.shard_index(&owned), map.shard_index("borrowed"));
    assert_eq!(map.get("borrowed"), Some(5));
  }

  #[test]
  fn delete_if_respects_predicate() {
    let map = seeded_map(4);
    map.set("k".to_string(), 1);
    assert_eq!(map.delete_if("k", |v| *v == 2), None);
    assert_eq!(map.len(), 1);
    assert_eq!(map.delete_if("k", |v| *v == 1), Some(1));
    assert_eq!(map.len(), 0);
    assert_eq!(map.delete_if("k", |_| true), None);
  }

  #[test]
  fn replace_with_only_touches_existing_keys() {
    let map = seeded_map(4);
    assert_eq!(map.replace_with("missing", |v| Some(v + 1)), None);
    assert!(map.is_empty());

    map.set("k".to_string(), 1);
    assert_eq!(map.replace_with("k", |v| Some(v + 1)), Some(1));
    assert_eq!(map.get("k"), Some(2));
    assert_eq!(map.replace_with("k", |_| None), None);
    assert_eq!(map.get("k"), Some(2));
    assert_eq!(map.len(), 1);
  }

  #[test]
  fn sample_returns_everything_from_small_maps() {
    let map = seeded_map(16);
    for i in 0..3 {
      map.set(format!("key-{}", i), i);
    }
    let mut rng = rand_pcg::Pcg64::seed_from_u64(7);
    let keys: HashSet<String> = map.sample(8, &mut rng).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), 3);
  }

  #[test]
  fn sample_is_bounded_by_count() {
    let map = seeded_map(16);
    for i in 0..500 {
      map.set(format!("key-{}", i), i);
    }
    let mut rng = rand_pcg::Pcg64::seed_from_u64(42);
    for count in [1, 5, 16, 40] {
      let samples = map.sample(count, &mut rng);
      assert_eq!(samples.len(), count);
    }
    assert!(map.sample(0, &mut rng).is_empty());
  }

  #[test]
  fn sample_survives_swap_removals() {
    let map = seeded_map(16);
    for i in 0..200 {
      map.set(format!("key-{}", i), i);
    }
    for i in (0..200).step_by(3) {
      map.delete(format!("key-{}", i).as_str());
    }
    let mut rng = rand_pcg::Pcg64::seed_from_u64(9);
    for (key, value) in map.sample(24, &mut rng) {
      assert_ne!(value % 3, 0, "deleted entry sampled");
      assert_eq!(map.get(key.as_str()), Some(value));
    }
  }

  #[test]
  fn sample_spreads_over_shards() {
    let map = seeded_map(16);
    for i in 0..1_000 {
      map.set(format!("key-{}", i), i);
    }
    let mut rng = rand_pcg::Pcg64::seed_from_u64(3);
    let shards: HashSet<usize> = map
      .sample(16, &mut rng)
      .iter()
      .map(|(k, _)| map.shard_index(k))
      .collect();
    assert!(shards.len() > 8, "samples concentrated in {} shards", shards.len());
  }
}
