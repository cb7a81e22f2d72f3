use fibre_lru::{CacheBuilder, LoadError};
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Barrier,
};
use std::thread;
use std::time::Duration;

// Both halves are derived from the key, so a torn value would show up as a
// mismatch between them.
#[derive(Debug)]
struct Pair {
  key: u64,
  doubled: u64,
}

impl Pair {
  fn new(key: u64) -> Self {
    Self { key, doubled: key * 2 }
  }

  fn check(&self, key: u64) {
    assert_eq!(self.key, key);
    assert_eq!(self.doubled, key * 2);
  }
}

#[test]
fn test_concurrent_get_set_storm() {
  let cache = CacheBuilder::<u64, Pair>::new()
    .maximum_entries(8)
    .expire_after_write(Duration::from_millis(5))
    .graceful_refresh(true)
    .refresh_workers(2)
    .loader(|key: &u64| -> Result<Option<Pair>, LoadError> { Ok(Some(Pair::new(*key))) })
    .build()
    .unwrap();

  let num_threads = 8;
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for t in 0..num_threads {
    let cache = cache.clone();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      for i in 0..5_000u64 {
        let key = (i * 7 + t as u64) % 16;
        match i % 5 {
          0 => cache.set(key, Pair::new(key)),
          1 => {
            cache.invalidate(&key);
          }
          _ => {
            if let Some(pair) = cache.get(&key).unwrap() {
              pair.check(key);
            }
          }
        }
      }
    }));
  }

  for handle in handles {
    handle.join().unwrap();
  }

  assert!(cache.len() <= 8, "{} entries left over a maximum of 8", cache.len());
  for (key, pair) in cache.iter() {
    pair.check(key);
  }
}

#[test]
fn test_concurrent_misses_on_distinct_keys() {
  let cache = CacheBuilder::<u64, u64>::new()
    .maximum_entries(10_000)
    .loader(|key: &u64| -> Result<Option<u64>, LoadError> {
      thread::sleep(Duration::from_micros(50));
      Ok(Some(key + 1))
    })
    .build()
    .unwrap();

  let num_threads = 8;
  let per_thread = 250u64;
  let barrier = Arc::new(Barrier::new(num_threads));
  let handles: Vec<_> = (0..num_threads as u64)
    .map(|t| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        for i in 0..per_thread {
          let key = t * per_thread + i;
          assert_eq!(cache.get(&key).unwrap().as_deref(), Some(&(key + 1)));
        }
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(cache.len(), num_threads * per_thread as usize);
  assert_eq!(cache.metrics().loads, num_threads as u64 * per_thread);
}

#[test]
fn test_stop_refresh_while_readers_run() {
  let cache = CacheBuilder::<u64, u64>::new()
    .expire_after_write(Duration::from_millis(1))
    .graceful_refresh(true)
    .refresh_queue_capacity(4)
    .loader(|key: &u64| -> Result<Option<u64>, LoadError> { Ok(Some(*key)) })
    .build()
    .unwrap();

  let running = Arc::new(AtomicBool::new(true));
  let readers: Vec<_> = (0..4u64)
    .map(|t| {
      let cache = cache.clone();
      let running = running.clone();
      thread::spawn(move || {
        let mut i = 0u64;
        while running.load(Ordering::Relaxed) {
          let key = (i + t) % 64;
          assert_eq!(cache.get(&key).unwrap().as_deref(), Some(&key));
          i += 1;
        }
      })
    })
    .collect();

  thread::sleep(Duration::from_millis(50));
  cache.stop_refresh();
  thread::sleep(Duration::from_millis(50));
  running.store(false, Ordering::Relaxed);

  for reader in readers {
    reader.join().unwrap();
  }
}
