//! Per-key cache records.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::api::ClientError;

/// Cached payload with its concrete type erased. Each key holds one type.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchResult = Result<Erased, ClientError>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
pub(crate) type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Freshness of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Data present and younger than its stale time
  Fresh,
  /// Missing, expired, or invalidated; eligible for refetch
  Stale,
  /// A request for this key is in flight
  Fetching,
  /// The most recent fetch failed
  Error,
}

/// Read-only view of an entry, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
  pub status: EntryStatus,
  pub has_data: bool,
  pub error: Option<ClientError>,
  /// Wall-clock time of the last successful fetch
  pub updated_at: Option<DateTime<Utc>>,
  pub subscribers: usize,
  pub invalidated: bool,
}

pub(crate) struct InFlight {
  pub id: u64,
  pub future: SharedFetch,
}

pub(crate) struct CacheEntry {
  pub data: Option<Erased>,
  pub error: Option<ClientError>,
  pub fetched_at: Option<Instant>,
  pub updated_at: Option<DateTime<Utc>>,
  pub stale_time: Duration,
  pub invalidated: bool,
  pub in_flight: Option<InFlight>,
  /// Invalidated while a fetch was running; fetch again once it lands
  pub refetch_queued: bool,
  /// Fetch function from the most recent descriptor for this key
  pub fetcher: Option<ErasedFetcher>,
  pub subscribers: usize,
  pub idle_since: Option<Instant>,
  version: watch::Sender<u64>,
}

impl CacheEntry {
  pub fn new(fetcher: ErasedFetcher, stale_time: Duration) -> Self {
    let (version, _rx) = watch::channel(0);
    Self {
      data: None,
      error: None,
      fetched_at: None,
      updated_at: None,
      stale_time,
      invalidated: false,
      in_flight: None,
      refetch_queued: false,
      fetcher: Some(fetcher),
      subscribers: 0,
      idle_since: Some(Instant::now()),
      version,
    }
  }

  pub fn is_stale(&self, now: Instant) -> bool {
    if self.invalidated || self.data.is_none() {
      return true;
    }
    self
      .fetched_at
      .map(|t| now.saturating_duration_since(t) > self.stale_time)
      .unwrap_or(true)
  }

  pub fn status(&self, now: Instant) -> EntryStatus {
    if self.in_flight.is_some() {
      EntryStatus::Fetching
    } else if self.error.is_some() {
      EntryStatus::Error
    } else if self.is_stale(now) {
      EntryStatus::Stale
    } else {
      EntryStatus::Fresh
    }
  }

  pub fn snapshot(&self, now: Instant) -> EntrySnapshot {
    EntrySnapshot {
      status: self.status(now),
      has_data: self.data.is_some(),
      error: self.error.clone(),
      updated_at: self.updated_at,
      subscribers: self.subscribers,
      invalidated: self.invalidated,
    }
  }

  pub fn record_success(&mut self, data: Erased) {
    self.data = Some(data);
    self.error = None;
    self.fetched_at = Some(Instant::now());
    self.updated_at = Some(Utc::now());
    self.invalidated = false;
  }

  pub fn record_failure(&mut self, error: ClientError) {
    self.error = Some(error);
  }

  /// Drop cached payload and any pending fetch, keeping subscriptions.
  pub fn reset(&mut self) {
    self.data = None;
    self.error = None;
    self.fetched_at = None;
    self.updated_at = None;
    self.invalidated = false;
    self.in_flight = None;
    self.refetch_queued = false;
  }

  pub fn watch(&self) -> watch::Receiver<u64> {
    self.version.subscribe()
  }

  /// Wake every handle watching this entry.
  pub fn notify(&self) {
    self.version.send_modify(|v| *v = v.wrapping_add(1));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::FutureExt;

  fn entry(stale_time: Duration) -> CacheEntry {
    let fetcher: ErasedFetcher = Arc::new(|| async { Ok::<_, ClientError>(Arc::new(1u32) as Erased) }.boxed());
    CacheEntry::new(fetcher, stale_time)
  }

  #[tokio::test(start_paused = true)]
  async fn test_freshness_follows_stale_time() {
    let mut e = entry(Duration::from_secs(30));
    assert_eq!(e.status(Instant::now()), EntryStatus::Stale);

    e.record_success(Arc::new(5u32));
    assert_eq!(e.status(Instant::now()), EntryStatus::Fresh);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(e.status(Instant::now()), EntryStatus::Stale);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_makes_fresh_data_stale() {
    let mut e = entry(Duration::from_secs(300));
    e.record_success(Arc::new(5u32));
    e.invalidated = true;
    assert_eq!(e.status(Instant::now()), EntryStatus::Stale);
    assert!(e.snapshot(Instant::now()).has_data);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_keeps_previous_data() {
    let mut e = entry(Duration::from_secs(30));
    e.record_success(Arc::new(5u32));
    e.record_failure(ClientError::NotSignedIn);

    let snap = e.snapshot(Instant::now());
    assert_eq!(snap.status, EntryStatus::Error);
    assert!(snap.has_data);
  }

  #[tokio::test]
  async fn test_notify_wakes_watchers() {
    let e = entry(Duration::from_secs(30));
    let mut rx = e.watch();
    e.notify();
    assert!(rx.has_changed().unwrap());
    rx.borrow_and_update();
    assert!(!rx.has_changed().unwrap());
  }
}
