//! A concurrent, size-bounded, read-through cache with approximate LRU
//! eviction and stale-while-revalidate refresh.
//!
//! # Features
//! - **Sharded**: keys are routed to independently locked shards by a
//!   chunked content hash and a jump consistent hash.
//! - **Read-through**: a [`Loader`] fills misses synchronously; `Ok(None)`
//!   from the loader is cached as "not found".
//! - **Approximate LRU**: evictions pick the least recently used entry out of
//!   a small pool of random samples instead of tracking a global order.
//! - **Graceful refresh**: stale entries keep being served while background
//!   workers reload them.
//! - **Observability**: counters via [`Cache::metrics`], eviction
//!   notifications via [`EvictionListener`] and `tracing` events.
//!
//! ```
//! use fibre_lru::{CacheBuilder, LoadError};
//! use std::time::Duration;
//!
//! let cache = CacheBuilder::<String, usize>::new()
//!   .maximum_entries(1_000)
//!   .expire_after_write(Duration::from_secs(60))
//!   .loader(|key: &String| Ok::<_, LoadError>(Some(key.len())))
//!   .build()
//!   .unwrap();
//!
//! assert_eq!(cache.get(&"hello".to_string()).unwrap().as_deref(), Some(&5));
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod listener;
pub mod loader;
pub mod metrics;
pub mod store;

// Internal, crate-only modules
mod entry;
mod eviction;
mod hash;
mod shared;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{CacheBuilder, Params};
pub use error::{BuildError, GetError, LoadError, RefreshError};
pub use handles::Cache;
pub use listener::{EvictionListener, EvictionReason};
pub use loader::Loader;
pub use metrics::MetricsSnapshot;
pub use store::ShardedMap;
