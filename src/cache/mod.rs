//! In-memory query cache.
//!
//! This module provides the process-wide table behind every query handle:
//! - Keys entries by resource path + canonical filter parameters
//! - Shares a single in-flight request between concurrent readers of a key
//! - Tracks freshness per entry using the stale time of its descriptor
//! - Marks entries stale on invalidation and refetches the subscribed ones
//! - Keeps unsubscribed entries for a grace period, then evicts them
//!
//! Nothing here is persisted. The cache is a freshness optimization over the
//! server, which stays the source of truth.

mod entry;
mod key;
mod layer;

pub use entry::{EntrySnapshot, EntryStatus};
pub(crate) use entry::{Erased, ErasedFetcher};
pub use key::{CacheKey, KeyFilter};
pub(crate) use layer::Lookup;
pub use layer::{QueryClient, DEFAULT_GC_TIME};
