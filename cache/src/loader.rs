use crate::error::LoadError;

/// Produces the value for a key on a cache miss and on every background refresh.
///
/// Generally the key refers to something like a row in a database or a
/// record behind a remote call. `Ok(None)` reports that the source has no
/// value for the key.
///
/// The cache imposes no mutual exclusion on loads: readers missing on
/// different keys, two readers missing on the same absent key, and refresh
/// workers may all call `load` at the same time.
///
/// A panic inside `load` on a miss unwinds into the caller of
/// [`Cache::get`](crate::Cache::get). A panic during a background refresh is
/// caught and stored on the entry as a [`LoadError::Failed`], which the next
/// reader receives like any other refresh failure.
pub trait Loader<K, V>: Send + Sync {
  fn load(&self, key: &K) -> Result<Option<V>, LoadError>;
}

impl<K, V, F> Loader<K, V> for F
where
  F: Fn(&K) -> Result<Option<V>, LoadError> + Send + Sync,
{
  #[inline]
  fn load(&self, key: &K) -> Result<Option<V>, LoadError> {
    self(key)
  }
}
