//! Process-wide query cache that orchestrates fetching, de-duplication and
//! invalidation.

use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::entry::{
  CacheEntry, EntrySnapshot, EntryStatus, ErasedFetcher, FetchResult, InFlight, SharedFetch,
};
use super::key::{CacheKey, KeyFilter};
use crate::api::ClientError;

/// How long an entry with no subscribers survives before garbage collection.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Outcome of asking the cache for a key.
pub(crate) enum Lookup {
  /// Fresh data, no request issued
  Ready(super::entry::Erased),
  /// A request is in flight (possibly one started by this call)
  Pending(SharedFetch),
  /// The last fetch failed and nothing asked for a retry
  Failed(ClientError),
}

struct Inner {
  entries: Mutex<HashMap<CacheKey, CacheEntry>>,
  next_fetch_id: AtomicU64,
  gc_time: Duration,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
    // A panic while holding the lock leaves plain data behind; keep serving it.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Start a fetch for `key` and record it as the entry's in-flight request.
  ///
  /// The caller holds the table lock. The request itself runs on a spawned
  /// task, so it completes even if every waiter goes away.
  fn start_fetch(self: &Arc<Self>, key: &CacheKey, entry: &mut CacheEntry) -> Option<SharedFetch> {
    let fetcher = entry.fetcher.clone()?;
    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let weak = Arc::downgrade(self);
    let owned_key = key.clone();
    let request = fetcher();

    let future = async move {
      let result = request.await;
      Inner::complete(&weak, &owned_key, id, &result);
      result
    }
    .boxed()
    .shared();

    debug!(key = %key.fingerprint(), fetch_id = id, "fetch started");
    entry.in_flight = Some(InFlight {
      id,
      future: future.clone(),
    });
    entry.notify();

    tokio::spawn(future.clone());
    Some(future)
  }

  /// Store a finished fetch, unless the entry was cleared or evicted since.
  fn complete(weak: &Weak<Self>, key: &CacheKey, id: u64, result: &FetchResult) {
    let Some(inner) = weak.upgrade() else {
      return;
    };
    let mut entries = inner.lock();
    let Some(entry) = entries.get_mut(key) else {
      debug!(key = %key.fingerprint(), fetch_id = id, "fetch result discarded, entry gone");
      return;
    };
    if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
      debug!(key = %key.fingerprint(), fetch_id = id, "fetch result discarded, superseded");
      return;
    }
    entry.in_flight = None;

    match result {
      Ok(data) => {
        debug!(key = %key.fingerprint(), fetch_id = id, "fetch succeeded");
        entry.record_success(data.clone());
      }
      Err(e) => {
        warn!(key = %key.fingerprint(), fetch_id = id, error = %e, "fetch failed");
        entry.record_failure(e.clone());
      }
    }

    if std::mem::take(&mut entry.refetch_queued) {
      // The data just stored may predate the mutation that invalidated it.
      entry.invalidated = true;
      if entry.subscribers > 0 {
        inner.start_fetch(key, entry);
      }
    }

    entry.notify();
  }
}

/// Shared, cloneable handle to the query cache.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  pub fn new() -> Self {
    Self::with_gc_time(DEFAULT_GC_TIME)
  }

  pub fn with_gc_time(gc_time: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        next_fetch_id: AtomicU64::new(1),
        gc_time,
      }),
    }
  }

  pub fn gc_time(&self) -> Duration {
    self.inner.gc_time
  }

  /// Register a subscriber for `key`, creating the entry on first use.
  pub(crate) fn register(
    &self,
    key: &CacheKey,
    fetcher: &ErasedFetcher,
    stale_time: Duration,
  ) -> watch::Receiver<u64> {
    let mut entries = self.inner.lock();
    let entry = entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(fetcher.clone(), stale_time));
    entry.fetcher = Some(fetcher.clone());
    entry.stale_time = stale_time;
    entry.subscribers += 1;
    entry.idle_since = None;
    entry.watch()
  }

  /// Drop a subscriber. The entry stays cached until garbage collection.
  pub(crate) fn unregister(&self, key: &CacheKey) {
    let mut entries = self.inner.lock();
    if let Some(entry) = entries.get_mut(key) {
      entry.subscribers = entry.subscribers.saturating_sub(1);
      if entry.subscribers == 0 {
        entry.idle_since = Some(Instant::now());
      }
    }
  }

  /// Resolve `key` from cache or network.
  ///
  /// Without `force`, fresh data is returned as-is and a failed entry is left
  /// alone. With `force`, a new request is issued unless one is already in
  /// flight, in which case that request is shared.
  pub(crate) fn ensure(
    &self,
    key: &CacheKey,
    fetcher: &ErasedFetcher,
    stale_time: Duration,
    force: bool,
  ) -> Lookup {
    let mut entries = self.inner.lock();
    let entry = entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(fetcher.clone(), stale_time));
    entry.fetcher = Some(fetcher.clone());
    entry.stale_time = stale_time;

    if let Some(in_flight) = &entry.in_flight {
      return Lookup::Pending(in_flight.future.clone());
    }

    if !force {
      if let (Some(error), false) = (&entry.error, entry.invalidated) {
        return Lookup::Failed(error.clone());
      }
      if let (Some(data), false) = (&entry.data, entry.is_stale(Instant::now())) {
        return Lookup::Ready(data.clone());
      }
    }

    match self.inner.start_fetch(key, entry) {
      Some(future) => Lookup::Pending(future),
      None => Lookup::Failed(ClientError::Internal(format!(
        "no fetch function registered for {}",
        key.resource()
      ))),
    }
  }

  /// Mark every entry matching `filters` stale and refetch the subscribed
  /// ones. Returns the number of keys refetched or queued for refetch.
  pub fn invalidate(&self, filters: &[KeyFilter]) -> usize {
    if filters.is_empty() {
      return 0;
    }

    let mut refetched = 0;
    let mut entries = self.inner.lock();
    for (key, entry) in entries.iter_mut() {
      if !filters.iter().any(|f| key.matches(f)) {
        continue;
      }

      entry.invalidated = true;
      if entry.subscribers > 0 {
        if entry.in_flight.is_some() {
          entry.refetch_queued = true;
          refetched += 1;
        } else if self.inner.start_fetch(key, entry).is_some() {
          refetched += 1;
        }
      }
      entry.notify();
    }

    info!(
      filters = filters.len(),
      refetched, "cache invalidated"
    );
    refetched
  }

  /// Evict entries with no subscribers that have been idle past `gc_time`.
  pub fn collect_garbage(&self) -> usize {
    let now = Instant::now();
    let gc_time = self.inner.gc_time;
    let mut entries = self.inner.lock();
    let before = entries.len();
    entries.retain(|_, entry| {
      let expired = entry.subscribers == 0
        && entry.in_flight.is_none()
        && entry
          .idle_since
          .map(|since| now.saturating_duration_since(since) >= gc_time)
          .unwrap_or(false);
      !expired
    });
    let evicted = before - entries.len();
    if evicted > 0 {
      debug!(evicted, remaining = entries.len(), "cache garbage collected");
    }
    evicted
  }

  /// Run [`collect_garbage`](Self::collect_garbage) periodically.
  pub fn spawn_gc(&self, every: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(&self.inner);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        QueryClient { inner }.collect_garbage();
      }
    })
  }

  /// Drop all cached data. Subscribed entries stay registered but empty, and
  /// results of requests still in flight are discarded when they arrive.
  pub fn clear(&self) {
    let mut entries = self.inner.lock();
    entries.retain(|_, entry| entry.subscribers > 0);
    for entry in entries.values_mut() {
      entry.reset();
      entry.notify();
    }
    info!(subscribed = entries.len(), "cache cleared");
  }

  /// Start a fetch for every subscribed entry that is not already fetching,
  /// e.g. after a new session so mounted views load again.
  pub fn refetch_subscribed(&self) -> usize {
    let mut refetched = 0;
    let mut entries = self.inner.lock();
    for (key, entry) in entries.iter_mut() {
      if entry.subscribers == 0 || entry.in_flight.is_some() {
        continue;
      }
      entry.invalidated = true;
      if self.inner.start_fetch(key, entry).is_some() {
        refetched += 1;
      }
    }
    debug!(refetched, "subscribed entries refetched");
    refetched
  }

  pub fn entry_status(&self, key: &CacheKey) -> Option<EntryStatus> {
    self
      .inner
      .lock()
      .get(key)
      .map(|entry| entry.status(Instant::now()))
  }

  pub fn snapshot(&self, key: &CacheKey) -> Option<EntrySnapshot> {
    self
      .inner
      .lock()
      .get(key)
      .map(|entry| entry.snapshot(Instant::now()))
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run `f` against the entry for `key`, if present.
  pub(crate) fn with_entry<R>(&self, key: &CacheKey, f: impl FnOnce(&CacheEntry) -> R) -> Option<R> {
    self.inner.lock().get(key).map(f)
  }
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}
