#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fibre_lru::{LoadError, Loader};
use rand::distr::{Alphanumeric, SampleString};
use rand::SeedableRng;
use rand_pcg::Pcg64;

// A loader backed by a mutable map, standing in for a database table.
// Tests keep a clone of the handle to edit the "source" behind the cache.
#[derive(Clone, Default)]
pub struct MapLoader {
  pub source: Arc<Mutex<HashMap<String, i32>>>,
  pub calls: Arc<AtomicUsize>,
  pub failing: Arc<AtomicBool>,
  pub panicking: Arc<AtomicBool>,
  pub gate: Arc<AtomicBool>,
}

impl MapLoader {
  pub fn new() -> Self {
    let loader = Self::default();
    loader.gate.store(true, Ordering::SeqCst);
    loader
  }

  pub fn put(&self, key: &str, value: i32) {
    self.source.lock().unwrap().insert(key.to_string(), value);
  }

  pub fn remove(&self, key: &str) {
    self.source.lock().unwrap().remove(key);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn set_panicking(&self, panicking: bool) {
    self.panicking.store(panicking, Ordering::SeqCst);
  }

  // While closed, loads wait inside the loader until it is reopened.
  pub fn close_gate(&self) {
    self.gate.store(false, Ordering::SeqCst);
  }

  pub fn open_gate(&self) {
    self.gate.store(true, Ordering::SeqCst);
  }
}

impl Loader<String, i32> for MapLoader {
  fn load(&self, key: &String) -> Result<Option<i32>, LoadError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    while !self.gate.load(Ordering::SeqCst) {
      thread::sleep(Duration::from_millis(1));
    }
    if self.panicking.load(Ordering::SeqCst) {
      panic!("source driver crashed on {}", key);
    }
    if self.failing.load(Ordering::SeqCst) {
      return Err(LoadError::msg("source unavailable"));
    }
    Ok(self.source.lock().unwrap().get(key).copied())
  }
}

// Polls `check` until it returns `Some` or `timeout` passes.
pub fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
  let deadline = Instant::now() + timeout;
  loop {
    if let Some(found) = check() {
      return Some(found);
    }
    if Instant::now() >= deadline {
      return None;
    }
    thread::sleep(Duration::from_millis(5));
  }
}

// Deterministic random keys of a fixed length.
pub fn random_keys(count: usize, len: usize, seed: u64) -> Vec<String> {
  let mut rng = Pcg64::seed_from_u64(seed);
  (0..count)
    .map(|_| Alphanumeric.sample_string(&mut rng, len))
    .collect()
}
