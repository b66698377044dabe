//! Declarative queries over the shared cache.
//!
//! Inspired by TanStack Query: a [`QueryDescriptor`] says what to fetch and how
//! long the result stays fresh; subscribing it to a [`QueryClient`] yields a
//! [`Query<T>`] handle that views read their loading/success/error state from.
//!
//! # Example
//!
//! ```ignore
//! let api = api_client.clone();
//! let descriptor = QueryDescriptor::new(CacheKey::new("dashboard/stats"), move || {
//!     let api = api.clone();
//!     async move { api.get("/dashboard/stats", &QueryParams::new()).await }
//! })
//! .stale_time(Duration::from_secs(60));
//!
//! // Mount: fetches unless the cache already holds fresh data
//! let mut query = cache.subscribe(descriptor);
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(&data),
//!     QueryState::Error(e) => render_error(&e.user_message()),
//!     QueryState::Idle => {}
//! }
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::ClientError;
use crate::cache::{CacheKey, Erased, ErasedFetcher, Lookup, QueryClient};

/// Default freshness window for list views.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ClientError>> + Send + Sync>;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Nothing fetched yet and nothing in flight
  Idle,
  /// First fetch in flight, no data to show
  Loading,
  /// Data available (a background refetch may be running)
  Success(Arc<T>),
  /// The last fetch failed
  Error(ClientError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&Arc<T>> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ClientError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Immutable description of a query: key, fetch function, freshness policy.
pub struct QueryDescriptor<T> {
  key: CacheKey,
  fetch: Fetcher<T>,
  stale_time: Duration,
  refetch_interval: Option<Duration>,
}

impl<T: Send + Sync + 'static> QueryDescriptor<T> {
  pub fn new<F, Fut>(key: CacheKey, fetch: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
  {
    Self {
      key,
      fetch: Arc::new(move || fetch().boxed()),
      stale_time: DEFAULT_STALE_TIME,
      refetch_interval: None,
    }
  }

  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Refetch unconditionally on this period while subscribed.
  pub fn refetch_interval(mut self, interval: Duration) -> Self {
    self.refetch_interval = Some(interval);
    self
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn stale_time_value(&self) -> Duration {
    self.stale_time
  }

  pub fn refetch_interval_value(&self) -> Option<Duration> {
    self.refetch_interval
  }

  fn erased(&self) -> ErasedFetcher {
    let fetch = Arc::clone(&self.fetch);
    Arc::new(move || {
      let request = fetch();
      async move { request.await.map(|data| Arc::new(data) as Erased) }.boxed()
    })
  }
}

impl QueryClient {
  /// Mount a query: register a subscriber, fetch if the entry is missing or
  /// stale, and start polling when the descriptor asks for it.
  pub fn subscribe<T: Send + Sync + 'static>(&self, descriptor: QueryDescriptor<T>) -> Query<T> {
    let fetcher = descriptor.erased();
    let changes = self.register(&descriptor.key, &fetcher, descriptor.stale_time);

    let poller = descriptor.refetch_interval.map(|interval| {
      let client = self.clone();
      let key = descriptor.key.clone();
      let fetcher = fetcher.clone();
      let stale_time = descriptor.stale_time;
      tokio::spawn(async move {
        let start = Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
          ticker.tick().await;
          client.ensure(&key, &fetcher, stale_time, true);
        }
      })
    });

    let query = Query {
      client: self.clone(),
      key: descriptor.key,
      fetcher,
      stale_time: descriptor.stale_time,
      changes,
      poller,
      _marker: PhantomData,
    };
    // A new mount retries an entry that failed before it ever held data.
    let retry = self
      .with_entry(&query.key, |entry| entry.error.is_some() && entry.data.is_none())
      .unwrap_or(false);
    self.ensure(&query.key, &query.fetcher, query.stale_time, retry);
    query
  }

  /// Fetch once through the cache without subscribing.
  pub async fn fetch_query<T: Send + Sync + 'static>(
    &self,
    descriptor: QueryDescriptor<T>,
  ) -> Result<Arc<T>, ClientError> {
    let fetcher = descriptor.erased();
    let lookup = self.ensure(&descriptor.key, &fetcher, descriptor.stale_time, false);
    resolve(lookup).await
  }
}

/// A mounted query. Dropping it unsubscribes (and stops any polling); the
/// cached entry outlives it until garbage collection.
pub struct Query<T> {
  client: QueryClient,
  key: CacheKey,
  fetcher: ErasedFetcher,
  stale_time: Duration,
  changes: watch::Receiver<u64>,
  poller: Option<JoinHandle<()>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Query<T> {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Current state of the underlying cache entry.
  pub fn state(&self) -> QueryState<T> {
    self
      .client
      .with_entry(&self.key, |entry| {
        let data = entry.data.clone().map(downcast::<T>);
        match (data, entry.in_flight.is_some(), &entry.error) {
          (Some(Ok(data)), _, None) | (Some(Ok(data)), true, Some(_)) => QueryState::Success(data),
          (Some(Err(e)), _, _) => QueryState::Error(e),
          (None, true, _) => QueryState::Loading,
          (_, false, Some(e)) => QueryState::Error(e.clone()),
          (None, false, None) => QueryState::Idle,
        }
      })
      .unwrap_or(QueryState::Idle)
  }

  /// Last successfully fetched data, even if a later refetch failed.
  pub fn data(&self) -> Option<Arc<T>> {
    self
      .client
      .with_entry(&self.key, |entry| entry.data.clone())
      .flatten()
      .and_then(|data| downcast::<T>(data).ok())
  }

  pub fn is_loading(&self) -> bool {
    self.state().is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state().is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state().is_error()
  }

  pub fn error(&self) -> Option<ClientError> {
    match self.state() {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  /// A request is in flight, initial or background.
  pub fn is_fetching(&self) -> bool {
    self
      .client
      .with_entry(&self.key, |entry| entry.in_flight.is_some())
      .unwrap_or(false)
  }

  pub fn is_stale(&self) -> bool {
    self
      .client
      .with_entry(&self.key, |entry| entry.is_stale(Instant::now()))
      .unwrap_or(true)
  }

  /// Fetch if missing or stale. No-op when fresh, in flight, or failed.
  pub fn fetch(&self) {
    self.client.ensure(&self.key, &self.fetcher, self.stale_time, false);
  }

  /// Fetch regardless of freshness, sharing any request already in flight.
  pub fn refetch(&self) {
    self.client.ensure(&self.key, &self.fetcher, self.stale_time, true);
  }

  /// Wait for the data: cached if fresh, otherwise from the in-flight or a
  /// new request.
  pub async fn load(&self) -> Result<Arc<T>, ClientError> {
    let lookup = self.client.ensure(&self.key, &self.fetcher, self.stale_time, false);
    resolve(lookup).await
  }

  /// Force a refetch and wait for its result.
  pub async fn reload(&self) -> Result<Arc<T>, ClientError> {
    let lookup = self.client.ensure(&self.key, &self.fetcher, self.stale_time, true);
    resolve(lookup).await
  }

  /// Wait until the entry changes. Returns `false` if the cache is gone.
  pub async fn changed(&mut self) -> bool {
    self.changes.changed().await.is_ok()
  }

  /// Non-blocking check for changes since the last call.
  ///
  /// Returns `true` if the state changed (data arrived, error occurred, fetch
  /// started). Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.changes.has_changed() {
      Ok(true) => {
        self.changes.borrow_and_update();
        true
      }
      _ => false,
    }
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(poller) = self.poller.take() {
      poller.abort();
    }
    self.client.unregister(&self.key);
  }
}

impl<T> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key.to_string())
      .field("stale_time", &self.stale_time)
      .field("polling", &self.poller.is_some())
      .finish_non_exhaustive()
  }
}

async fn resolve<T: Send + Sync + 'static>(lookup: Lookup) -> Result<Arc<T>, ClientError> {
  match lookup {
    Lookup::Ready(data) => downcast(data),
    Lookup::Pending(future) => downcast(future.await?),
    Lookup::Failed(e) => Err(e),
  }
}

fn downcast<T: Send + Sync + 'static>(data: Erased) -> Result<Arc<T>, ClientError> {
  data.downcast::<T>().map_err(|_| {
    ClientError::Internal(format!(
      "cached value is not a {}",
      std::any::type_name::<T>()
    ))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{EntryStatus, KeyFilter};
  use std::sync::atomic::{AtomicU32, Ordering};

  fn counting(key: &str, calls: &Arc<AtomicU32>) -> QueryDescriptor<u32> {
    let calls = calls.clone();
    QueryDescriptor::new(CacheKey::new(key), move || {
      let calls = calls.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
      }
    })
  }

  #[tokio::test]
  async fn test_query_success() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let query = cache.subscribe(counting("stats", &calls));

    assert!(query.is_loading());
    assert_eq!(*query.load().await.unwrap(), 1);
    assert!(query.is_success());
    assert_eq!(query.data().as_deref(), Some(&1));
  }

  #[tokio::test]
  async fn test_query_error() {
    let cache = QueryClient::new();
    let query: Query<u32> = cache.subscribe(QueryDescriptor::new(CacheKey::new("broken"), || async {
      Err(ClientError::NotSignedIn)
    }));

    assert_eq!(query.load().await.unwrap_err(), ClientError::NotSignedIn);
    assert!(query.is_error());
    assert_eq!(query.error(), Some(ClientError::NotSignedIn));
  }

  #[tokio::test]
  async fn test_failed_query_is_not_retried_silently() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let query: Query<u32> = cache.subscribe(QueryDescriptor::new(CacheKey::new("flaky"), move || {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::NotSignedIn)
      }
    }));

    let _ = query.load().await;
    query.fetch();
    let _ = query.load().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let _ = query.reload().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_new_mount_retries_error_without_data() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let descriptor = |calls: &Arc<AtomicU32>| {
      let counter = calls.clone();
      QueryDescriptor::<u32>::new(CacheKey::new("patients/9"), move || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err(ClientError::NotSignedIn)
        }
      })
    };

    let first = cache.subscribe(descriptor(&calls));
    let _ = first.load().await;
    let second = cache.subscribe(descriptor(&calls));
    let _ = second.load().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_concurrent_subscribers_share_one_request() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let a = cache.subscribe(counting("patients", &calls));
    let b = cache.subscribe(counting("patients", &calls));
    let (ra, rb) = tokio::join!(a.load(), b.load());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&ra.unwrap(), &rb.unwrap()));
  }

  #[tokio::test]
  async fn test_fetch_while_fresh_is_noop() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let query = cache.subscribe(counting("providers", &calls).stale_time(Duration::from_secs(60)));
    query.load().await.unwrap();

    query.fetch();
    query.load().await.unwrap();
    assert!(!query.is_fetching());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_dedupes_against_in_flight() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let query = cache.subscribe(counting("orders", &calls));

    query.refetch();
    query.refetch();
    assert_eq!(*query.load().await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_entry_refetches_on_mount() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let first = cache.subscribe(counting("invoices", &calls).stale_time(Duration::from_secs(30)));
    first.load().await.unwrap();
    drop(first);

    tokio::time::advance(Duration::from_secs(10)).await;
    let again = cache.subscribe(counting("invoices", &calls).stale_time(Duration::from_secs(30)));
    assert_eq!(*again.load().await.unwrap(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    let later = cache.subscribe(counting("invoices", &calls).stale_time(Duration::from_secs(30)));
    assert_eq!(*later.load().await.unwrap(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_polling_refetches_until_dropped() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let query = cache.subscribe(
      counting("emergency/track-board", &calls).refetch_interval(Duration::from_secs(15)),
    );
    query.load().await.unwrap();

    tokio::time::sleep(Duration::from_secs(46)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    drop(query);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_poll_reports_changes() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = cache.subscribe(counting("labs", &calls));

    assert!(query.poll());
    assert!(!query.poll());
    query.load().await.unwrap();
    assert!(query.poll());
  }

  #[tokio::test]
  async fn test_invalidate_refetches_subscribed_keys_only() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let other_calls = Arc::new(AtomicU32::new(0));

    let mounted = cache.subscribe(counting("radiology/reports", &calls));
    mounted.load().await.unwrap();
    let unmounted = cache.subscribe(counting("radiology/reports/7", &other_calls));
    unmounted.load().await.unwrap();
    drop(unmounted);

    let refetched = cache.invalidate(&[KeyFilter::resource("radiology/reports")]);
    assert_eq!(refetched, 1);
    assert_eq!(*mounted.load().await.unwrap(), 2);
    assert_eq!(other_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
      cache.entry_status(&CacheKey::new("radiology/reports/7")),
      Some(EntryStatus::Stale)
    );
  }

  #[tokio::test]
  async fn test_dropped_handle_still_fills_cache() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let query = cache.subscribe(counting("appointments", &calls));
    drop(query);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = cache.snapshot(&CacheKey::new("appointments")).unwrap();
    assert!(snapshot.has_data);
    assert_eq!(snapshot.subscribers, 0);
  }

  #[tokio::test]
  async fn test_clear_then_refetch_subscribed_reloads_mounted_queries() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let mut mounted = cache.subscribe(counting("patients", &calls));
    let unmounted = cache.subscribe(counting("providers", &calls));
    mounted.load().await.unwrap();
    unmounted.load().await.unwrap();
    drop(unmounted);

    cache.clear();
    assert!(mounted.data().is_none());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.refetch_subscribed(), 1);

    while mounted.data().is_none() {
      assert!(mounted.changed().await);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_type_mismatch_is_internal_error() {
    let cache = QueryClient::new();
    let numbers = cache.subscribe(QueryDescriptor::new(CacheKey::new("shared"), || async {
      Ok::<_, ClientError>(1u32)
    }));
    numbers.load().await.unwrap();

    let strings: Query<String> = cache.subscribe(QueryDescriptor::new(CacheKey::new("shared"), || async {
      Ok("one".to_string())
    }));
    assert!(matches!(strings.load().await, Err(ClientError::Internal(_))));
  }
}
