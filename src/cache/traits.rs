//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Anything that can live in the cache.
///
/// Values are stored as JSON so one store can hold feed pages, counters
/// and flags side by side.
pub trait CacheValue: Serialize + DeserializeOwned + Send + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + 'static {}

pub(crate) fn encode<T: CacheValue>(value: &T) -> Result<Value> {
  serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize cache value: {}", e))
}

pub(crate) fn decode<T: CacheValue>(value: &Value) -> Result<T> {
  T::deserialize(value).map_err(|e| eyre!("Failed to deserialize cache value: {}", e))
}

/// A pure function predicting a post-mutation value from the current one.
///
/// Predictions must be deterministic: a rollback re-applies the remaining
/// predictions to the confirmed value, so the same prediction may run
/// more than once.
#[derive(Clone)]
pub struct Prediction(Arc<dyn Fn(Option<&Value>) -> Result<Option<Value>> + Send + Sync>);

impl Prediction {
  /// Wrap a typed prediction. `None` means "no cached value".
  pub fn typed<T, F>(predict: F) -> Self
  where
    T: CacheValue,
    F: Fn(Option<T>) -> Option<T> + Send + Sync + 'static,
  {
    Self(Arc::new(move |current| {
      let current = current.map(decode::<T>).transpose()?;
      predict(current).as_ref().map(encode).transpose()
    }))
  }

  pub fn apply(&self, current: Option<&Value>) -> Result<Option<Value>> {
    (self.0)(current)
  }
}

impl fmt::Debug for Prediction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Prediction(..)")
  }
}

/// Visible value of one key captured before an optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub value: Option<Value>,
}

impl Snapshot {
  pub fn typed<T: CacheValue>(&self) -> Result<Option<T>> {
    self.value.as_ref().map(decode).transpose()
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }

  /// The network answer arrived after an optimistic write and was dropped.
  pub fn superseded(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Superseded,
      cached_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Offline mode - network unavailable, serving cached data
  Offline,
  /// A read that was cancelled by a newer optimistic write; the cached
  /// (optimistic) value is returned instead of the late response
  Superseded,
}
