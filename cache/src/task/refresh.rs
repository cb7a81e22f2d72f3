use crate::entry::CacheEntry;
use crate::error::{BuildError, LoadError, RefreshError};
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::store::ShardedMap;

use std::hash::{BuildHasher, Hash};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fibre::mpmc;
use parking_lot::Mutex;

/// The thread-safe parts of the cache a refresh worker needs.
///
/// Workers hold this rather than the cache itself, so a running worker never
/// keeps the cache alive.
pub(crate) struct RefreshContext<K: Send, V: Send + Sync, H> {
  pub(crate) store: Arc<ShardedMap<K, Arc<CacheEntry<V>>, H>>,
  pub(crate) loader: Arc<dyn Loader<K, V>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) expire_after_write: Option<Duration>,
}

impl<K, V, H> RefreshContext<K, V, H>
where
  K: Eq + Hash + Send,
  V: Send + Sync,
  H: BuildHasher + Clone,
{
  /// Consumes keys until the queue is closed and drained.
  pub(crate) fn run(&self, receiver: &mpmc::Receiver<K>) {
    while let Ok(key) = receiver.recv() {
      self.refresh(key);
    }
  }

  /// Reloads one key and swaps the outcome into the map.
  fn refresh(&self, key: K) {
    let Some(entry) = self.store.get(&key) else {
      // Evicted or invalidated between being queued and being picked up.
      Metrics::incr(&self.metrics.refresh_missing);
      tracing::debug!("refresh skipped, entry is no longer cached");
      return;
    };

    // A write after the key was queued already produced a fresh entry.
    if !entry.is_refreshing() || entry.refresh_error().is_some() {
      tracing::trace!("refresh skipped, entry was rewritten");
      return;
    }

    // A panicking loader fails this refresh only; the worker keeps running.
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(&key)))
      .unwrap_or_else(|_| {
        tracing::warn!("loader panicked during refresh");
        Err(LoadError::msg("loader panicked"))
      });

    let outcome = match loaded {
      Ok(Some(value)) => Ok(Some(Arc::new(value))),
      Ok(None) if entry.has_value() => Err(LoadError::NotFound),
      Ok(None) => Ok(None),
      Err(error) => Err(error),
    };

    let failure = outcome.as_ref().err().cloned();
    let replacement = match outcome {
      Ok(value) => CacheEntry::new(value, self.expire_after_write),
      Err(error) => entry.failed_refresh(error),
    };

    let applied = self
      .store
      .replace_with(&key, |current| {
        Arc::ptr_eq(current, &entry).then(|| Arc::new(replacement))
      })
      .is_some();

    match (applied, failure) {
      (false, _) => tracing::debug!("refresh result discarded, entry changed while loading"),
      (true, None) => {
        Metrics::incr(&self.metrics.refreshes);
        tracing::trace!("entry refreshed");
      }
      (true, Some(error)) => {
        Metrics::incr(&self.metrics.refresh_failures);
        tracing::debug!(%error, "refresh failed, entry marked for removal");
      }
    }
  }
}

/// The bounded queue of keys awaiting reload, plus the workers draining it.
///
/// Stopping closes the queue: workers finish whatever is already queued and
/// return, and later enqueue attempts are rejected instead of failing loudly.
pub(crate) struct RefreshPipeline<K: Send, V: Send + Sync, H> {
  sender: mpmc::Sender<K>,
  receiver: mpmc::Receiver<K>,
  stopped: AtomicBool,
  context: Option<Arc<RefreshContext<K, V, H>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<K, V, H> RefreshPipeline<K, V, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Creates the pipeline. Without a loader (`context` is `None`) keys can
  /// still be queued but nothing will ever consume them.
  pub(crate) fn new(capacity: usize, context: Option<RefreshContext<K, V, H>>) -> Self {
    let (sender, receiver) = mpmc::bounded(capacity);
    Self {
      sender,
      receiver,
      stopped: AtomicBool::new(false),
      context: context.map(Arc::new),
      workers: Mutex::new(Vec::new()),
    }
  }

  /// Starts `count` background workers owned by the pipeline.
  pub(crate) fn spawn_workers(&self, count: usize) -> Result<(), BuildError> {
    let Some(context) = &self.context else {
      tracing::debug!("graceful refresh enabled without a loader, no workers started");
      return Ok(());
    };

    let mut workers = self.workers.lock();
    for id in 0..count {
      let context = Arc::clone(context);
      let receiver = self.receiver.clone();
      let handle = thread::Builder::new()
        .name(format!("fibre-lru-refresh-{}", id))
        .spawn(move || {
          tracing::debug!(worker = id, "refresh worker started");
          context.run(&receiver);
          tracing::debug!(worker = id, "refresh worker stopped");
        })?;
      workers.push(handle);
    }
    Ok(())
  }

  /// Queues `key` for reload, blocking while the queue is full.
  ///
  /// Returns `false` once the pipeline has been stopped, or if it has no
  /// loader to consume the queue.
  pub(crate) fn enqueue(&self, key: K) -> bool {
    if !self.is_active() {
      return false;
    }
    self.sender.send(key).is_ok()
  }

  /// Runs a worker on the calling thread until the pipeline is stopped.
  pub(crate) fn run(&self) -> Result<(), RefreshError> {
    if self.is_stopped() {
      return Err(RefreshError::Stopped);
    }
    let context = self.context.as_ref().ok_or(RefreshError::NoLoader)?;
    context.run(&self.receiver);
    Ok(())
  }

  /// Closes the queue. Idempotent.
  pub(crate) fn stop(&self) {
    if self.stopped.swap(true, Ordering::AcqRel) {
      return;
    }
    let _ = self.sender.close();
    tracing::debug!(pending = self.receiver.len(), "refresh stopped");
  }

  #[inline]
  pub(crate) fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Acquire)
  }

  /// Whether queued keys will be consumed.
  #[inline]
  pub(crate) fn is_active(&self) -> bool {
    self.context.is_some() && !self.is_stopped()
  }

  /// The number of keys waiting in the queue.
  #[inline]
  pub(crate) fn pending(&self) -> usize {
    self.receiver.len()
  }
}

impl<K: Send, V: Send + Sync, H> Drop for RefreshPipeline<K, V, H> {
  fn drop(&mut self) {
    if !self.stopped.swap(true, Ordering::AcqRel) {
      let _ = self.sender.close();
    }
    // Workers blocked inside a loader call are left to finish on their own.
    for handle in self.workers.get_mut().drain(..) {
      if handle.is_finished() {
        let _ = handle.join();
      }
    }
  }
}
