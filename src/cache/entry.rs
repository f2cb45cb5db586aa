//! A single cache entry: confirmed server value plus optimistic deltas.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde_json::Value;

use super::traits::{Prediction, Snapshot};

/// Identifier of one optimistic mutation.
pub type MutationId = u64;

#[derive(Debug, Clone)]
struct Delta {
  id: MutationId,
  prediction: Prediction,
  /// The network action succeeded; the delta stays applied until a
  /// refetch replaces it with server data.
  settled: bool,
}

/// A cached value and its optimistic history.
///
/// `visible` is always `confirmed` with every delta applied in order.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
  confirmed: Option<Value>,
  visible: Option<Value>,
  deltas: Vec<Delta>,
  fetched_at: Option<DateTime<Utc>>,
  stale: bool,
  epoch: u64,
}

impl CacheEntry {
  /// Entry seeded by a successful read.
  pub fn fetched(value: Value, at: DateTime<Utc>) -> Self {
    Self {
      confirmed: Some(value.clone()),
      visible: Some(value),
      fetched_at: Some(at),
      ..Self::default()
    }
  }

  pub fn visible(&self) -> Option<&Value> {
    self.visible.as_ref()
  }

  pub fn confirmed(&self) -> Option<&Value> {
    self.confirmed.as_ref()
  }

  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }

  pub fn is_stale(&self) -> bool {
    self.stale
  }

  /// Read generation; bumped whenever in-flight reads must be discarded.
  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Whether any delta is still waiting for its network action.
  pub fn has_pending(&self) -> bool {
    self.deltas.iter().any(|d| !d.settled)
  }

  pub fn delta_count(&self) -> usize {
    self.deltas.len()
  }

  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      value: self.visible.clone(),
    }
  }

  pub(crate) fn mark_stale(&mut self) {
    self.stale = true;
  }

  pub(crate) fn cancel_reads(&mut self) {
    self.epoch += 1;
  }

  /// Apply a prediction on top of the current visible value.
  pub(crate) fn apply(&mut self, id: MutationId, prediction: Prediction) -> Result<()> {
    let next = prediction.apply(self.visible.as_ref())?;
    self.visible = next;
    self.deltas.push(Delta {
      id,
      prediction,
      settled: false,
    });
    Ok(())
  }

  /// Remove a mutation's deltas and rebuild the visible value from the remaining ones.
  ///
  /// Returns false when the delta is unknown (already confirmed away).
  pub(crate) fn rollback(&mut self, id: MutationId) -> Result<bool> {
    if !self.deltas.iter().any(|d| d.id == id) {
      return Ok(false);
    }
    let remaining: Vec<Delta> = self.deltas.iter().filter(|d| d.id != id).cloned().collect();
    self.visible = replay(self.confirmed.as_ref(), &remaining)?;
    self.deltas = remaining;
    Ok(true)
  }

  /// Mark a mutation's deltas as confirmed by the server.
  ///
  /// Leading settled deltas are folded into `confirmed` so the history
  /// stays bounded even when nobody refetches the entry.
  pub(crate) fn settle(&mut self, id: MutationId) -> Result<bool> {
    let mut found = false;
    for delta in self.deltas.iter_mut().filter(|d| d.id == id) {
      delta.settled = true;
      found = true;
    }
    if !found {
      return Ok(false);
    }

    let mut confirmed = self.confirmed.clone();
    let mut folded = 0;
    for delta in self.deltas.iter().take_while(|d| d.settled) {
      confirmed = delta.prediction.apply(confirmed.as_ref())?;
      folded += 1;
    }
    self.confirmed = confirmed;
    self.deltas.drain(..folded);
    Ok(true)
  }

  /// Replace the confirmed value with authoritative server data.
  ///
  /// Settled deltas are already reflected by the server and are dropped;
  /// pending ones are re-applied on top.
  pub(crate) fn confirm(&mut self, value: Value, at: DateTime<Utc>) -> Result<()> {
    let remaining: Vec<Delta> = self.deltas.iter().filter(|d| !d.settled).cloned().collect();
    let confirmed = Some(value);
    self.visible = replay(confirmed.as_ref(), &remaining)?;
    self.confirmed = confirmed;
    self.deltas = remaining;
    self.fetched_at = Some(at);
    self.stale = false;
    Ok(())
  }
}

fn replay(base: Option<&Value>, deltas: &[Delta]) -> Result<Option<Value>> {
  let mut value = base.cloned();
  for delta in deltas {
    value = delta.prediction.apply(value.as_ref())?;
  }
  Ok(value)
}
