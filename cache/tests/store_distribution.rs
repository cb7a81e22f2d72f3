mod common;

use fibre_lru::ShardedMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn assert_uniform(num_shards: usize) {
  let map: ShardedMap<String, ()> =
    ShardedMap::with_hasher(num_shards, ahash::RandomState::with_seeds(1, 2, 3, 4));
  let keys = common::random_keys(100_000, 32, 2024);

  let mut counts = vec![0usize; num_shards];
  for key in &keys {
    counts[map.shard_index(key)] += 1;
  }

  let expected = keys.len() as f64 / num_shards as f64;
  for (shard, &count) in counts.iter().enumerate() {
    let deviation = (count as f64 - expected).abs() / expected;
    assert!(
      deviation <= 0.10,
      "shard {} holds {} keys, expected about {:.0}",
      shard,
      count,
      expected
    );
  }
}

#[test]
fn test_keys_spread_evenly_over_16_shards() {
  assert_uniform(16);
}

#[test]
fn test_keys_spread_evenly_over_32_shards() {
  assert_uniform(32);
}

#[test]
fn test_long_keys_route_deterministically() {
  let map: ShardedMap<String, u32> = ShardedMap::new(16);
  let keys = common::random_keys(100, 500, 7);
  for key in &keys {
    let shard = map.shard_index(key);
    assert_eq!(map.shard_index(key.as_str()), shard);
  }
}

#[test]
fn test_basic_map_operations() {
  let map: ShardedMap<String, u32> = ShardedMap::new(16);
  assert_eq!(map.num_shards(), 16);
  assert!(map.is_empty());

  assert_eq!(map.set("a".to_string(), 1), None);
  assert_eq!(map.set("b".to_string(), 2), None);
  assert_eq!(map.set("a".to_string(), 3), Some(1));
  assert_eq!(map.len(), 2);

  assert_eq!(map.get("a"), Some(3));
  assert!(map.contains_key("b"));
  assert_eq!(map.delete("b"), Some(2));
  assert_eq!(map.delete("b"), None);
  assert_eq!(map.len(), 1);
  assert_eq!(map.get("b"), None);
}

#[test]
fn test_snapshot_visits_every_entry_once() {
  let map: ShardedMap<u32, u32> = ShardedMap::new(16);
  for i in 0..1_000 {
    map.set(i, i * 2);
  }

  let mut seen = HashSet::new();
  for (key, value) in map.snapshot() {
    assert_eq!(value, key * 2);
    assert!(seen.insert(key), "key {} yielded twice", key);
  }
  assert_eq!(seen.len(), 1_000);
}

#[test]
fn test_snapshot_does_not_block_writers() {
  let map: ShardedMap<u32, u32> = ShardedMap::new(16);
  for i in 0..100 {
    map.set(i, i);
  }

  let mut snapshot = map.snapshot();
  let first = snapshot.next();
  assert!(first.is_some());
  // The shard that produced `first` has already been released.
  map.set(1_000, 1_000);
  map.delete(&0);
  assert!(snapshot.count() >= 98);
}

#[test]
fn test_len_converges_under_concurrent_mutation() {
  let map: Arc<ShardedMap<u64, u64>> = Arc::new(ShardedMap::new(16));
  let handles: Vec<_> = (0..8u64)
    .map(|t| {
      let map = map.clone();
      thread::spawn(move || {
        for i in 0..1_000u64 {
          let key = t * 1_000 + i;
          map.set(key, key);
          if i % 2 == 0 {
            map.delete(&key);
          }
        }
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(map.len(), 4_000);
  assert_eq!(map.snapshot().count(), 4_000);
}
