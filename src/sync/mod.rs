//! Optimistic mutations over the query cache.

mod mutation;
mod notify;
mod synchronizer;
mod toggle;

pub use mutation::{
  ActionKind, MutationPlan, MutationSlot, MutationStatus, OptimisticUpdate, PendingMutation, Target,
};
pub use notify::{Level, Notification, Notifier};
pub use synchronizer::{InFlight, MutationError, Synchronizer};
pub use toggle::ToggleState;
