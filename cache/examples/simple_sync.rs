use fibre_lru::CacheBuilder;
use std::thread;
use std::time::Duration;

fn main() {
  // A cache of at most 100 entries that go stale 2 seconds after being written.
  let cache = CacheBuilder::<String, i32>::new()
    .maximum_entries(100)
    .expire_after_write(Duration::from_secs(2))
    .build()
    .expect("Failed to build cache");

  println!("Setting ('key1', 100).");
  cache.set("key1".to_string(), 100);

  match cache.get(&"key1".to_string()) {
    Ok(Some(value)) => println!("Found value for key1: {}", value),
    Ok(None) => println!("Value for key1 not found."),
    Err(e) => println!("Lookup failed: {}", e),
  }

  println!("\nWaiting 3 seconds for the entry to go stale...");
  thread::sleep(Duration::from_secs(3));

  // Without graceful refresh the stale value is served once and then dropped.
  for attempt in 1..=2 {
    match cache.get(&"key1".to_string()) {
      Ok(Some(value)) => println!("Read {}: stale value {}", attempt, value),
      Ok(None) => println!("Read {}: not found", attempt),
      Err(e) => println!("Read {}: failed: {}", attempt, e),
    }
  }

  println!("\nCache metrics: {:#?}", cache.metrics());
}
