//! Cache storage trait and in-memory implementation.

use color_eyre::Result;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::entry::CacheEntry;
use super::key::CacheKey;

/// Trait for cache storage backends.
///
/// The store is a plain key-value map of entries; all optimistic logic
/// lives in [`super::QueryCache`]. Injecting the store keeps the cache
/// testable without a network or a UI.
pub trait CacheStore: Send + Sync {
  /// Get a copy of an entry.
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

  /// Atomically read-modify-write one entry. Leaving the slot `None`
  /// removes the entry.
  fn update<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Option<CacheEntry>) -> R) -> Result<R>;

  /// Remove an entry, returning it.
  fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

  /// All keys currently held.
  fn keys(&self) -> Result<Vec<CacheKey>>;

  /// Drop everything.
  fn clear(&self) -> Result<()>;
}

/// Session-scoped storage. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl MemoryStore {
  /// A panic inside `update` never leaves a half-written entry behind, so a
  /// poisoned map is still consistent and safe to keep using.
  fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    Ok(self.entries().get(key).cloned())
  }

  fn update<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Option<CacheEntry>) -> R) -> Result<R> {
    let mut entries = self.entries();

    // Work on a copy; the stored entry only changes once `f` has returned
    let mut slot = entries.get(key).cloned();
    let result = f(&mut slot);
    match slot {
      Some(entry) => {
        entries.insert(key.clone(), entry);
      }
      None => {
        entries.remove(key);
      }
    }

    Ok(result)
  }

  fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    Ok(self.entries().remove(key))
  }

  fn keys(&self) -> Result<Vec<CacheKey>> {
    let mut keys: Vec<CacheKey> = self.entries().keys().cloned().collect();
    keys.sort();
    Ok(keys)
  }

  fn clear(&self) -> Result<()> {
    self.entries().clear();
    Ok(())
  }
}
