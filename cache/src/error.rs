use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

/// An error produced by a [`Loader`](crate::Loader).
///
/// Loader errors are cloneable because a failed background refresh is stored
/// on the entry and handed to whichever reader observes it next.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
  /// The key no longer has a value at its source.
  #[error("entry not found")]
  NotFound,
  /// The loader failed with an application error.
  #[error("loader failed: {0}")]
  Failed(Arc<dyn StdError + Send + Sync>),
}

impl LoadError {
  /// Wraps an arbitrary application error.
  pub fn failed<E>(error: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    LoadError::Failed(Arc::new(error))
  }

  /// Builds an error from a plain message.
  pub fn msg(message: impl Into<String>) -> Self {
    let boxed: Box<dyn StdError + Send + Sync> = message.into().into();
    LoadError::Failed(Arc::from(boxed))
  }
}

/// Errors returned by [`Cache::get`](crate::Cache::get).
pub enum GetError<V> {
  /// The key was missing and the synchronous load failed. Nothing was cached.
  Load(LoadError),
  /// A previous background refresh of this key failed.
  ///
  /// The entry has been removed by this read, so the next `get` performs a
  /// fresh synchronous load. `stale` is the last value the entry held.
  Refresh {
    stale: Option<Arc<V>>,
    source: LoadError,
  },
}

impl<V> GetError<V> {
  /// Returns the underlying loader error.
  pub fn load_error(&self) -> &LoadError {
    match self {
      GetError::Load(error) => error,
      GetError::Refresh { source, .. } => source,
    }
  }

  /// Consumes the error, returning the stale value if this was a refresh failure.
  pub fn into_stale(self) -> Option<Arc<V>> {
    match self {
      GetError::Load(_) => None,
      GetError::Refresh { stale, .. } => stale,
    }
  }
}

// Manual impls so that `V` does not need to be `Debug` or `Clone`.
impl<V> Clone for GetError<V> {
  fn clone(&self) -> Self {
    match self {
      GetError::Load(error) => GetError::Load(error.clone()),
      GetError::Refresh { stale, source } => GetError::Refresh {
        stale: stale.clone(),
        source: source.clone(),
      },
    }
  }
}

impl<V> fmt::Debug for GetError<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GetError::Load(error) => f.debug_tuple("Load").field(error).finish(),
      GetError::Refresh { stale, source } => f
        .debug_struct("Refresh")
        .field("has_stale", &stale.is_some())
        .field("source", source)
        .finish(),
    }
  }
}

impl<V> fmt::Display for GetError<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GetError::Load(error) => write!(f, "load failed: {}", error),
      GetError::Refresh { source, .. } => write!(f, "background refresh failed: {}", source),
    }
  }
}

impl<V> StdError for GetError<V> {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    Some(self.load_error())
  }
}

/// Errors returned by [`Cache::run_refresh`](crate::Cache::run_refresh).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
  /// The cache was built without graceful refresh.
  #[error("cache is not configured with graceful refresh")]
  NotEnabled,
  /// The cache was built without a loader.
  #[error("cache is not configured with a loader")]
  NoLoader,
  /// `stop_refresh` has already been called.
  #[error("refresh has been stopped")]
  Stopped,
}

/// Errors that can occur when building a cache.
#[derive(Debug)]
pub enum BuildError {
  /// A background thread (refresh worker or notifier) could not be spawned.
  Spawn(io::Error),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::Spawn(error) => write!(f, "failed to spawn cache background thread: {}", error),
    }
  }
}

impl StdError for BuildError {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    match self {
      BuildError::Spawn(error) => Some(error),
    }
  }
}

impl From<io::Error> for BuildError {
  fn from(error: io::Error) -> Self {
    BuildError::Spawn(error)
  }
}
