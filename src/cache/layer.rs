//! Query cache that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::entry::{CacheEntry, MutationId};
use super::key::{CacheKey, KeyPrefix};
use super::store::{CacheStore, MemoryStore};
use super::traits::{decode, encode, CacheResult, CacheSource, CacheValue, Prediction, Snapshot};

type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Outcome of committing a network read into the cache.
enum Commit {
  Stored(Value),
  Superseded(Option<Value>),
  /// The cache was cleared after the read started
  Discarded,
}

/// Process-wide query cache.
///
/// Reads go through [`QueryCache::fetch`]; the fetcher is remembered so
/// invalidated entries can be refetched later. Optimistic writes are only
/// reachable through the crate's synchronizer.
pub struct QueryCache<S: CacheStore = MemoryStore> {
  store: Arc<S>,
  fetchers: Arc<Mutex<HashMap<CacheKey, FetchFn>>>,
  /// Bumped by `clear`; reads started under an older generation never commit
  generation: Arc<AtomicU64>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl QueryCache<MemoryStore> {
  pub fn in_memory() -> Self {
    Self::new(MemoryStore::new())
  }
}

impl<S: CacheStore> QueryCache<S> {
  /// Create a new query cache with the given storage backend.
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(store),
      fetchers: Arc::new(Mutex::new(HashMap::new())),
      generation: Arc::new(AtomicU64::new(0)),
      stale_time: Duration::minutes(1),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    !entry.is_stale()
      && entry
        .fetched_at()
        .map(|at| Utc::now() - at <= self.stale_time)
        .unwrap_or(false)
  }

  /// Fetch a value with cache-first strategy.
  ///
  /// 1. Fresh cached value: return immediately
  /// 2. Otherwise fetch from network and store as the confirmed value
  /// 3. On network failure, return the cached value (offline mode)
  /// 4. If an optimistic write cancelled this read meanwhile, the late
  ///    response is dropped and the cached value is returned
  pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: CacheValue,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let fetch_fn: FetchFn = Arc::new(move || {
      let fut = fetcher();
      async move {
        let data = fut.await?;
        encode(&data)
      }
      .boxed()
    });
    self.register(key, fetch_fn.clone())?;

    if let Some(entry) = self.store.get(key)? {
      if self.is_fresh(&entry) {
        if let Some(value) = entry.visible() {
          debug!(%key, "cache hit");
          return Ok(CacheResult::from_cache(decode(value)?, entry.fetched_at()));
        }
      }
    }

    let result = self.read(key, &fetch_fn).await?;
    let data = decode(&result.data)?;
    Ok(result.map(|_| data))
  }

  fn register(&self, key: &CacheKey, fetch_fn: FetchFn) -> Result<()> {
    self
      .fetchers
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .insert(key.clone(), fetch_fn);
    Ok(())
  }

  /// Read from the network and commit unless superseded.
  async fn read(&self, key: &CacheKey, fetch_fn: &FetchFn) -> Result<CacheResult<Value>> {
    let generation = self.generation.load(Ordering::SeqCst);
    let epoch = self.store.get(key)?.map(|e| e.epoch()).unwrap_or(0);

    let value = match fetch_fn().await {
      Ok(value) => value,
      Err(err) => {
        let cached = self.store.get(key)?;
        return match cached.as_ref().and_then(|e| e.visible().map(|v| (e, v))) {
          Some((entry, visible)) => {
            warn!(%key, error = %err, "network read failed, serving cached value");
            Ok(CacheResult::offline(visible.clone(), entry.fetched_at()))
          }
          None => Err(err),
        };
      }
    };

    let now = Utc::now();
    let commit = self.store.update(key, |slot| -> Result<Commit> {
      if self.generation.load(Ordering::SeqCst) != generation {
        return Ok(Commit::Discarded);
      }
      match slot {
        Some(entry) if entry.epoch() == epoch => {
          entry.confirm(value.clone(), now)?;
          Ok(Commit::Stored(entry.visible().cloned().unwrap_or_else(|| value.clone())))
        }
        Some(entry) => Ok(Commit::Superseded(entry.visible().cloned())),
        None if epoch == 0 => {
          *slot = Some(CacheEntry::fetched(value.clone(), now));
          Ok(Commit::Stored(value.clone()))
        }
        // Evicted while the read was in flight.
        None => Ok(Commit::Superseded(None)),
      }
    })??;

    match commit {
      Commit::Stored(visible) => {
        debug!(%key, "stored network value");
        Ok(CacheResult::from_network(visible))
      }
      Commit::Superseded(cached) => {
        debug!(%key, "read superseded by optimistic write");
        let fetched_at = self.store.get(key)?.and_then(|e| e.fetched_at());
        Ok(CacheResult::superseded(cached.unwrap_or(value), fetched_at))
      }
      Commit::Discarded => {
        debug!(%key, "read started before cache was cleared, not stored");
        Ok(CacheResult::superseded(value, None))
      }
    }
  }

  /// Visible value of a key (confirmed value plus pending optimistic deltas).
  pub fn peek<T: CacheValue>(&self, key: &CacheKey) -> Result<Option<T>> {
    match self.store.get(key)? {
      Some(entry) => entry.visible().map(decode).transpose(),
      None => Ok(None),
    }
  }

  /// Last value confirmed by the server (or by a settled mutation).
  pub fn peek_confirmed<T: CacheValue>(&self, key: &CacheKey) -> Result<Option<T>> {
    match self.store.get(key)? {
      Some(entry) => entry.confirmed().map(decode).transpose(),
      None => Ok(None),
    }
  }

  pub fn snapshot(&self, key: &CacheKey) -> Result<Snapshot> {
    Ok(
      self
        .store
        .get(key)?
        .map(|e| e.snapshot())
        .unwrap_or(Snapshot { value: None }),
    )
  }

  pub fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    self.store.get(key)
  }

  /// Keys of every entry matching the prefix.
  pub fn keys_matching(&self, prefix: &KeyPrefix) -> Result<Vec<CacheKey>> {
    Ok(
      self
        .store
        .keys()?
        .into_iter()
        .filter(|k| k.matches(prefix))
        .collect(),
    )
  }

  /// Mark matching entries stale so the next read goes to the network.
  pub fn invalidate(&self, prefix: &KeyPrefix) -> Result<Vec<CacheKey>> {
    let keys = self.keys_matching(prefix)?;
    for key in &keys {
      self.store.update(key, |slot| {
        if let Some(entry) = slot {
          entry.mark_stale();
        }
      })?;
    }
    debug!(%prefix, count = keys.len(), "invalidated");
    Ok(keys)
  }

  /// Refetch every matching entry that has a registered fetcher.
  ///
  /// Failures are logged and leave the entry stale. Returns how many
  /// entries were refreshed.
  pub async fn refetch(&self, prefix: &KeyPrefix) -> Result<usize> {
    let targets: Vec<(CacheKey, FetchFn)> = {
      let fetchers = self
        .fetchers
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      self
        .keys_matching(prefix)?
        .into_iter()
        .filter_map(|k| fetchers.get(&k).cloned().map(|f| (k, f)))
        .collect()
    };

    let results = join_all(targets.iter().map(|(key, f)| self.read(key, f))).await;

    let mut refreshed = 0;
    for ((key, _), result) in targets.iter().zip(results) {
      match result {
        Ok(r) if r.source == CacheSource::Network => refreshed += 1,
        Ok(_) => {}
        Err(err) => warn!(%key, error = %err, "refetch failed"),
      }
    }
    Ok(refreshed)
  }

  /// Remove matching entries and forget their fetchers.
  pub fn evict(&self, prefix: &KeyPrefix) -> Result<usize> {
    let keys = self.keys_matching(prefix)?;
    let mut fetchers = self
      .fetchers
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    for key in &keys {
      self.store.remove(key)?;
      fetchers.remove(key);
    }
    Ok(keys.len())
  }

  /// Drop every entry, e.g. on login as another user.
  ///
  /// Reads still in flight are not stored when they complete.
  pub fn clear(&self) -> Result<()> {
    self.generation.fetch_add(1, Ordering::SeqCst);
    self
      .fetchers
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clear();
    self.store.clear()
  }

  /// Cancel in-flight reads, snapshot, and apply a prediction, atomically.
  pub(crate) fn apply_delta(
    &self,
    key: &CacheKey,
    id: MutationId,
    prediction: Prediction,
  ) -> Result<Snapshot> {
    self.store.update(key, |slot| -> Result<Snapshot> {
      let entry = slot.get_or_insert_with(CacheEntry::default);
      entry.cancel_reads();
      let snapshot = entry.snapshot();
      entry.apply(id, prediction)?;
      Ok(snapshot)
    })?
  }

  pub(crate) fn rollback_delta(&self, key: &CacheKey, id: MutationId) -> Result<bool> {
    self.store.update(key, |slot| match slot {
      Some(entry) => entry.rollback(id),
      None => Ok(false),
    })?
  }

  pub(crate) fn settle_delta(&self, key: &CacheKey, id: MutationId) -> Result<bool> {
    self.store.update(key, |slot| match slot {
      Some(entry) => entry.settle(id),
      None => Ok(false),
    })?
  }
}

impl<S: CacheStore> Clone for QueryCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetchers: Arc::clone(&self.fetchers),
      generation: Arc::clone(&self.generation),
      stale_time: self.stale_time,
    }
  }
}
