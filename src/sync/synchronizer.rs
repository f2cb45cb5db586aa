//! Optimistic synchronizer: write the predicted value now, reconcile later.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

use super::mutation::{
  ActionKind, MutationPlan, MutationSlot, MutationStatus, OptimisticUpdate, PendingMutation, Target,
};
use super::notify::Notifier;
use super::toggle::ToggleState;
use crate::api::ApiError;
use crate::cache::{
  CacheKey, CacheStore, CacheValue, KeyPrefix, MemoryStore, MutationId, QueryCache,
};

/// How many settled mutations are kept for inspection
const HISTORY_LIMIT: usize = 32;

#[derive(Error, Debug)]
pub enum MutationError {
  /// Same action on the same resource is still in flight.
  #[error("{0} is already in progress")]
  AlreadyPending(MutationSlot),

  #[error(transparent)]
  Api(#[from] ApiError),

  /// The cache could not apply or undo a prediction.
  #[error("Cache error: {0}")]
  Cache(String),
}

impl From<color_eyre::Report> for MutationError {
  fn from(report: color_eyre::Report) -> Self {
    MutationError::Cache(report.to_string())
  }
}

#[derive(Default)]
struct Registry {
  next_id: MutationId,
  in_flight: HashMap<MutationSlot, PendingMutation>,
  history: VecDeque<PendingMutation>,
}

impl Registry {
  fn finish(&mut self, slot: &MutationSlot, status: MutationStatus) {
    if let Some(mut mutation) = self.in_flight.remove(slot) {
      mutation.status = status;
      self.history.push_front(mutation);
      self.history.truncate(HISTORY_LIMIT);
    }
  }
}

/// Applies mutations to the query cache ahead of the server and
/// reconciles once the server answers.
pub struct Synchronizer<S: CacheStore = MemoryStore> {
  cache: QueryCache<S>,
  notifier: Notifier,
  registry: Arc<Mutex<Registry>>,
}

impl<S: CacheStore> Clone for Synchronizer<S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      notifier: self.notifier.clone(),
      registry: Arc::clone(&self.registry),
    }
  }
}

impl<S: CacheStore + 'static> Synchronizer<S> {
  pub fn new(cache: QueryCache<S>, notifier: Notifier) -> Self {
    Self {
      cache,
      notifier,
      registry: Arc::new(Mutex::new(Registry::default())),
    }
  }

  pub fn cache(&self) -> &QueryCache<S> {
    &self.cache
  }

  pub fn notifier(&self) -> &Notifier {
    &self.notifier
  }

  fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
    self
      .registry
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Optimistically update one key and run `action`.
  ///
  /// On success the key's prefix is invalidated and refetched; on failure
  /// the prediction is rolled back and the error is notified once.
  pub async fn perform<T, F, Fut, R>(
    &self,
    key: CacheKey,
    predict: F,
    action: Fut,
  ) -> Result<R, MutationError>
  where
    T: CacheValue,
    F: Fn(Option<T>) -> Option<T> + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>>,
  {
    let plan = MutationPlan::new(MutationSlot::new(ActionKind::Update, &key))
      .invalidate(key.prefix())
      .update(OptimisticUpdate::new(key, predict));
    self.execute(plan, action).await
  }

  pub async fn execute<Fut, R>(&self, plan: MutationPlan, action: Fut) -> Result<R, MutationError>
  where
    Fut: Future<Output = Result<R, ApiError>>,
  {
    self.begin(plan)?.complete(action).await
  }

  /// Apply every prediction in `plan` right away.
  ///
  /// In-flight reads of the touched keys are cancelled so a late response
  /// cannot overwrite the prediction. Nothing here awaits, so two calls
  /// made in order write the cache in that order.
  pub fn begin(&self, plan: MutationPlan) -> Result<InFlight<S>, MutationError> {
    let mut registry = self.registry()?;
    if registry.in_flight.contains_key(&plan.slot) {
      debug!(slot = %plan.slot, "duplicate submission ignored");
      return Err(MutationError::AlreadyPending(plan.slot));
    }

    registry.next_id += 1;
    let id = registry.next_id;
    let mut mutation = PendingMutation {
      id,
      slot: plan.slot.clone(),
      snapshots: Vec::new(),
      status: MutationStatus::Pending,
      started_at: Utc::now(),
    };

    if let Err(err) = self.apply_updates(id, &plan.updates, &mut mutation) {
      for key in mutation.keys() {
        if let Err(e) = self.cache.rollback_delta(key, id) {
          warn!(%key, error = %e, "rollback after failed apply");
        }
      }
      return Err(err.into());
    }

    debug!(slot = %plan.slot, id, keys = mutation.snapshots.len(), "optimistic write applied");
    let keys = mutation.keys().cloned().collect();
    registry.in_flight.insert(plan.slot.clone(), mutation);

    Ok(InFlight {
      sync: self.clone(),
      id,
      slot: plan.slot,
      keys,
      invalidates: plan.invalidates,
      done: false,
    })
  }

  fn apply_updates(
    &self,
    id: MutationId,
    updates: &[OptimisticUpdate],
    mutation: &mut PendingMutation,
  ) -> Result<()> {
    for update in updates {
      let keys = match &update.target {
        Target::Key(key) => vec![key.clone()],
        Target::Prefix(prefix) => self.cache.keys_matching(prefix)?,
      };
      for key in keys {
        let snapshot = self.cache.apply_delta(&key, id, update.prediction.clone())?;
        // First snapshot of a key is the one that matters
        if !mutation.snapshots.iter().any(|(k, _)| k == &key) {
          mutation.snapshots.push((key, snapshot));
        }
      }
    }
    Ok(())
  }

  /// Surface a precondition failure without touching the cache.
  pub fn reject(&self, err: ApiError) -> MutationError {
    self.notifier.error(err.to_string());
    MutationError::Api(err)
  }

  pub fn is_pending(&self, slot: &MutationSlot) -> Result<bool> {
    Ok(self.registry()?.in_flight.contains_key(slot))
  }

  /// Mutations waiting for the server, oldest first.
  pub fn pending(&self) -> Result<Vec<PendingMutation>> {
    let mut pending: Vec<PendingMutation> = self.registry()?.in_flight.values().cloned().collect();
    pending.sort_by_key(|m| m.id);
    Ok(pending)
  }

  /// Recently finished mutations, newest first.
  pub fn history(&self) -> Result<Vec<PendingMutation>> {
    Ok(self.registry()?.history.iter().cloned().collect())
  }

  /// Toggle state of `key` as seen through `extract`.
  ///
  /// `None` until the key has been read (or predicted) at least once.
  pub fn toggle_state<T, V, F>(
    &self,
    slot: &MutationSlot,
    key: &CacheKey,
    extract: F,
  ) -> Result<Option<ToggleState<V>>>
  where
    T: CacheValue,
    F: Fn(&T) -> V,
  {
    let visible = self.cache.peek::<T>(key)?;
    let confirmed = self.cache.peek_confirmed::<T>(key)?;
    let pending = self.is_pending(slot)?;

    Ok(match (visible, confirmed) {
      (Some(visible), Some(confirmed)) if pending => Some(ToggleState::Pending {
        confirmed: extract(&confirmed),
        predicted: extract(&visible),
      }),
      (Some(visible), _) => Some(ToggleState::Idle(extract(&visible))),
      (None, _) => None,
    })
  }

  fn settle(&self, id: MutationId, keys: &[CacheKey]) {
    for key in keys {
      if let Err(e) = self.cache.settle_delta(key, id) {
        warn!(%key, error = %e, "failed to settle optimistic write");
      }
    }
  }

  fn rollback(&self, id: MutationId, keys: &[CacheKey]) {
    for key in keys {
      if let Err(e) = self.cache.rollback_delta(key, id) {
        warn!(%key, error = %e, "failed to roll back optimistic write");
      }
    }
  }

  fn finish(&self, slot: &MutationSlot, status: MutationStatus) {
    match self.registry() {
      Ok(mut registry) => registry.finish(slot, status),
      Err(e) => warn!(%slot, error = %e, "failed to release mutation slot"),
    }
  }

  /// Invalidate and refetch everything the mutation wrote or named.
  ///
  /// Written keys are covered even when the plan forgot to list them, so no
  /// settled prediction outlives the mutation unconfirmed.
  async fn reconcile(&self, written: &[CacheKey], invalidates: &[KeyPrefix]) {
    let mut prefixes = invalidates.to_vec();
    for key in written {
      if !prefixes.iter().any(|p| key.matches(p)) {
        prefixes.push(key.prefix());
      }
    }

    for prefix in &prefixes {
      if let Err(e) = self.cache.invalidate(prefix) {
        warn!(%prefix, error = %e, "invalidate failed");
        continue;
      }
      match self.cache.refetch(prefix).await {
        Ok(n) => debug!(%prefix, refreshed = n, "refetched"),
        Err(e) => warn!(%prefix, error = %e, "refetch failed"),
      }
    }
  }
}

/// A mutation whose prediction is visible and whose action has not
/// finished yet.
///
/// Dropping it without calling [`InFlight::complete`] rolls the
/// prediction back.
pub struct InFlight<S: CacheStore + 'static = MemoryStore> {
  sync: Synchronizer<S>,
  id: MutationId,
  slot: MutationSlot,
  keys: Vec<CacheKey>,
  invalidates: Vec<KeyPrefix>,
  done: bool,
}

impl<S: CacheStore + 'static> InFlight<S> {
  pub fn id(&self) -> MutationId {
    self.id
  }

  pub fn slot(&self) -> &MutationSlot {
    &self.slot
  }

  /// Await the network action and reconcile the cache with its outcome.
  pub async fn complete<Fut, R>(mut self, action: Fut) -> Result<R, MutationError>
  where
    Fut: Future<Output = Result<R, ApiError>>,
  {
    let outcome = action.await;
    self.done = true;

    match outcome {
      Ok(value) => {
        self.sync.settle(self.id, &self.keys);
        self.sync.finish(&self.slot, MutationStatus::Succeeded);
        debug!(slot = %self.slot, id = self.id, "mutation confirmed");
        self.sync.reconcile(&self.keys, &self.invalidates).await;
        Ok(value)
      }
      Err(err) => {
        self.sync.rollback(self.id, &self.keys);
        self.sync.finish(&self.slot, MutationStatus::Failed);
        warn!(slot = %self.slot, id = self.id, error = %err, "mutation failed, rolled back");
        self.sync.notifier.error(err.to_string());
        Err(MutationError::Api(err))
      }
    }
  }
}

impl<S: CacheStore + 'static> Drop for InFlight<S> {
  fn drop(&mut self) {
    if !self.done {
      warn!(slot = %self.slot, id = self.id, "mutation abandoned, rolling back");
      self.sync.rollback(self.id, &self.keys);
      self.sync.finish(&self.slot, MutationStatus::Failed);
      self.sync.notifier.info(format!("{} cancelled", self.slot));
    }
  }
}
