//! Client-side query cache with optimistic-update support.
//!
//! This module provides a resource-agnostic cache that:
//! - Addresses values by resource + id + query parameters
//! - Serves fresh values from memory and refetches stale ones
//! - Provides basic offline mode (serve cached value when network unavailable)
//! - Tracks optimistic deltas on top of the last server-confirmed value
//! - Drops reads that were overtaken by an optimistic write

mod entry;
mod key;
mod layer;
mod store;
mod traits;

pub use entry::{CacheEntry, MutationId};
pub use key::{CacheKey, KeyPrefix};
pub use layer::QueryCache;
pub use store::{CacheStore, MemoryStore};
pub use traits::{CacheResult, CacheSource, CacheValue, Prediction, Snapshot};
