/// State of an on/off control (like, follow, save).
///
/// `Idle` is seeded by the first read; a mutation moves it to `Pending`
/// and settlement brings it back to `Idle` with either the predicted
/// value (success) or the confirmed one (failure). There is no terminal
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleState<V> {
  Idle(V),
  Pending { confirmed: V, predicted: V },
}

impl<V> ToggleState<V> {
  /// What the user sees right now
  pub fn visible(&self) -> &V {
    match self {
      ToggleState::Idle(v) => v,
      ToggleState::Pending { predicted, .. } => predicted,
    }
  }

  pub fn confirmed(&self) -> &V {
    match self {
      ToggleState::Idle(v) => v,
      ToggleState::Pending { confirmed, .. } => confirmed,
    }
  }

  /// The triggering control should be disabled while this is true
  pub fn is_pending(&self) -> bool {
    matches!(self, ToggleState::Pending { .. })
  }

  pub fn map<U>(self, f: impl Fn(V) -> U) -> ToggleState<U> {
    match self {
      ToggleState::Idle(v) => ToggleState::Idle(f(v)),
      ToggleState::Pending {
        confirmed,
        predicted,
      } => ToggleState::Pending {
        confirmed: f(confirmed),
        predicted: f(predicted),
      },
    }
  }
}

impl<V> ToggleState<Option<V>> {
  /// `None` when the visible value is missing. A missing confirmed value
  /// means there is nothing to go back to, so the state reads as idle.
  pub fn transpose(self) -> Option<ToggleState<V>> {
    match self {
      ToggleState::Idle(v) => v.map(ToggleState::Idle),
      ToggleState::Pending {
        confirmed,
        predicted,
      } => match (confirmed, predicted) {
        (Some(confirmed), Some(predicted)) => Some(ToggleState::Pending {
          confirmed,
          predicted,
        }),
        (None, predicted) => predicted.map(ToggleState::Idle),
        (Some(_), None) => None,
      },
    }
  }
}
