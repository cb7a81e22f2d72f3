use fibre_lru::{CacheBuilder, LoadError};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
  // Stands in for a slow upstream whose value changes over time.
  let version = Arc::new(AtomicI32::new(1));
  let upstream = version.clone();

  let cache = CacheBuilder::<String, i32>::new()
    .expire_after_write(Duration::from_millis(500))
    .graceful_refresh(true)
    .loader(move |key: &String| -> Result<Option<i32>, LoadError> {
      println!("  [loader] fetching '{}'...", key);
      thread::sleep(Duration::from_millis(300));
      Ok(Some(upstream.load(Ordering::SeqCst)))
    })
    .build()
    .expect("Failed to build cache");

  let key = "config".to_string();
  println!("First read blocks on the loader: {:?}", cache.get(&key).unwrap());

  version.store(2, Ordering::SeqCst);
  thread::sleep(Duration::from_millis(600));

  // Stale: served immediately while a worker reloads it.
  println!("Stale read returns at once: {:?}", cache.get(&key).unwrap());
  thread::sleep(Duration::from_millis(400));
  println!("After the refresh: {:?}", cache.get(&key).unwrap());

  cache.stop_refresh();
  println!("\nCache metrics: {:#?}", cache.metrics());
}
