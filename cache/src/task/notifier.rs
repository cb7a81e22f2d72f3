use crate::error::BuildError;
use crate::listener::{EvictionListener, EvictionReason};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fibre::mpsc;

/// A message sent to the notifier thread.
pub(crate) type Notification<K, V> = (K, Option<Arc<V>>, EvictionReason);

/// Capacity of the notification channel. Senders use `try_send`, so a slow
/// listener causes notifications to be dropped rather than stalling readers.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;

/// The background thread responsible for calling the user's eviction listener.
pub(crate) struct Notifier<K: Send, V: Send + Sync> {
  handle: JoinHandle<()>,
  sender: mpsc::BoundedSender<Notification<K, V>>,
}

impl<K: Send, V: Send + Sync> Notifier<K, V> {
  /// Spawns a new notifier thread.
  pub(crate) fn spawn(listener: Arc<dyn EvictionListener<K, V>>) -> Result<Self, BuildError>
  where
    K: 'static,
    V: 'static,
  {
    let (tx, rx): (
      mpsc::BoundedSender<Notification<K, V>>,
      mpsc::BoundedReceiver<Notification<K, V>>,
    ) = mpsc::bounded(NOTIFICATION_CHANNEL_CAPACITY);

    let handle = thread::Builder::new()
      .name("fibre-lru-notifier".into())
      .spawn(move || {
        // Ends once every sender is gone, i.e. when the cache is dropped.
        while let Ok((key, value, reason)) = rx.recv() {
          listener.on_evict(key, value, reason);
        }
        tracing::trace!("eviction notifier exiting");
      })?;

    Ok(Self { handle, sender: tx })
  }

  /// Queues a notification without blocking.
  #[inline]
  pub(crate) fn notify(&self, key: K, value: Option<Arc<V>>, reason: EvictionReason) {
    if self.sender.try_send((key, value, reason)).is_err() {
      tracing::debug!(%reason, "eviction notification dropped");
    }
  }

  /// Disconnects the channel so the notifier thread drains and exits.
  pub(crate) fn stop(self) {
    drop(self.sender);
    if self.handle.is_finished() {
      let _ = self.handle.join();
    }
  }
}
