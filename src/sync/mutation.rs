//! Mutation descriptions: what to predict, where, and what to reconcile.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::cache::{CacheKey, CacheValue, KeyPrefix, MutationId, Prediction, Snapshot};

/// Kind of user action behind a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
  Like,
  Unlike,
  Follow,
  Unfollow,
  Save,
  Unsave,
  AddComment,
  DeleteComment,
  DeletePost,
  /// Generic single-key update
  Update,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ActionKind::Like => "like",
      ActionKind::Unlike => "unlike",
      ActionKind::Follow => "follow",
      ActionKind::Unfollow => "unfollow",
      ActionKind::Save => "save",
      ActionKind::Unsave => "unsave",
      ActionKind::AddComment => "add-comment",
      ActionKind::DeleteComment => "delete-comment",
      ActionKind::DeletePost => "delete-post",
      ActionKind::Update => "update",
    }
  }
}

/// The (action-kind, resource-id) pair. At most one mutation per slot is
/// in flight at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationSlot {
  pub action: ActionKind,
  pub resource: String,
}

impl MutationSlot {
  pub fn new(action: ActionKind, resource: impl ToString) -> Self {
    Self {
      action,
      resource: resource.to_string(),
    }
  }
}

impl fmt::Display for MutationSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.action.as_str(), self.resource)
  }
}

/// Where an optimistic update lands
#[derive(Debug, Clone)]
pub enum Target {
  /// One key; the prediction runs even when nothing is cached yet
  Key(CacheKey),
  /// Every existing entry under the prefix (e.g. all feed pages)
  Prefix(KeyPrefix),
}

/// One predicted change
#[derive(Debug, Clone)]
pub struct OptimisticUpdate {
  pub target: Target,
  pub prediction: Prediction,
}

impl OptimisticUpdate {
  /// Predict the next value of `key` from its current value.
  pub fn new<T, F>(key: CacheKey, predict: F) -> Self
  where
    T: CacheValue,
    F: Fn(Option<T>) -> Option<T> + Send + Sync + 'static,
  {
    Self {
      target: Target::Key(key),
      prediction: Prediction::typed(predict),
    }
  }

  /// Edit the cached value in place; no-op when nothing is cached.
  pub fn modify<T, F>(key: CacheKey, edit: F) -> Self
  where
    T: CacheValue,
    F: Fn(&mut T) + Send + Sync + 'static,
  {
    Self::new(key, move |current: Option<T>| {
      current.map(|mut value| {
        edit(&mut value);
        value
      })
    })
  }

  /// Edit every cached entry under `prefix` in place.
  pub fn modify_all<T, F>(prefix: KeyPrefix, edit: F) -> Self
  where
    T: CacheValue,
    F: Fn(&mut T) + Send + Sync + 'static,
  {
    Self {
      target: Target::Prefix(prefix),
      prediction: Prediction::typed(move |current: Option<T>| {
        current.map(|mut value| {
          edit(&mut value);
          value
        })
      }),
    }
  }
}

/// Everything a mutation touches besides the network action itself
#[derive(Debug, Clone)]
pub struct MutationPlan {
  pub slot: MutationSlot,
  pub updates: Vec<OptimisticUpdate>,
  /// Refetched after the action succeeds
  pub invalidates: Vec<KeyPrefix>,
}

impl MutationPlan {
  pub fn new(slot: MutationSlot) -> Self {
    Self {
      slot,
      updates: Vec::new(),
      invalidates: Vec::new(),
    }
  }

  pub fn update(mut self, update: OptimisticUpdate) -> Self {
    self.updates.push(update);
    self
  }

  pub fn invalidate(mut self, prefix: KeyPrefix) -> Self {
    self.invalidates.push(prefix);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
  Pending,
  Succeeded,
  Failed,
}

/// Bookkeeping for one optimistic action
#[derive(Debug, Clone)]
pub struct PendingMutation {
  pub id: MutationId,
  pub slot: MutationSlot,
  /// Keys written optimistically with the visible value each had before
  pub snapshots: Vec<(CacheKey, Snapshot)>,
  pub status: MutationStatus,
  pub started_at: DateTime<Utc>,
}

impl PendingMutation {
  pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
    self.snapshots.iter().map(|(k, _)| k)
  }
}
