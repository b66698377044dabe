//! Write operations that invalidate cached queries on success.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::ClientError;
use crate::cache::{KeyFilter, QueryClient};

type Run<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, ClientError>> + Send + Sync>;
type Invalidates<I, O> = Arc<dyn Fn(&I, &O) -> Vec<KeyFilter> + Send + Sync>;
type Validate<I> = Arc<dyn Fn(&I) -> Result<(), ClientError> + Send + Sync>;

/// What a mutation sends and which cached queries it makes stale.
pub struct MutationDescriptor<I, O> {
  name: &'static str,
  run: Run<I, O>,
  validate: Option<Validate<I>>,
  invalidates: Vec<KeyFilter>,
  invalidates_with: Option<Invalidates<I, O>>,
}

impl<I, O> Clone for MutationDescriptor<I, O> {
  fn clone(&self) -> Self {
    Self {
      name: self.name,
      run: self.run.clone(),
      validate: self.validate.clone(),
      invalidates: self.invalidates.clone(),
      invalidates_with: self.invalidates_with.clone(),
    }
  }
}

impl<I: Send + 'static, O: Send + Sync + 'static> MutationDescriptor<I, O> {
  pub fn new<F, Fut>(name: &'static str, run: F) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ClientError>> + Send + 'static,
  {
    Self {
      name,
      run: Arc::new(move |input| run(input).boxed()),
      validate: None,
      invalidates: Vec::new(),
      invalidates_with: None,
    }
  }

  /// Invalidate these filters after every successful call.
  pub fn invalidates(mut self, filters: impl IntoIterator<Item = KeyFilter>) -> Self {
    self.invalidates.extend(filters);
    self
  }

  /// Invalidate filters derived from the input and the server's response,
  /// e.g. the detail key of the record that was just updated.
  pub fn invalidates_with<F>(mut self, f: F) -> Self
  where
    F: Fn(&I, &O) -> Vec<KeyFilter> + Send + Sync + 'static,
  {
    self.invalidates_with = Some(Arc::new(f));
    self
  }

  /// Reject inputs before they reach the network.
  pub fn validate<F>(mut self, f: F) -> Self
  where
    F: Fn(&I) -> Result<(), ClientError> + Send + Sync + 'static,
  {
    self.validate = Some(Arc::new(f));
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  fn filters(&self, input: &I, output: &O) -> Vec<KeyFilter> {
    let mut filters = self.invalidates.clone();
    if let Some(derive) = &self.invalidates_with {
      filters.extend(derive(input, output));
    }
    filters
  }
}

/// The state of a mutation
#[derive(Debug)]
pub enum MutationState<O> {
  Idle,
  Pending,
  Success(Arc<O>),
  Error(ClientError),
}

// Derived Clone would demand `O: Clone`; the payload is behind an Arc
impl<O> Clone for MutationState<O> {
  fn clone(&self) -> Self {
    match self {
      Self::Idle => Self::Idle,
      Self::Pending => Self::Pending,
      Self::Success(output) => Self::Success(output.clone()),
      Self::Error(e) => Self::Error(e.clone()),
    }
  }
}

/// A mutation bound to a cache.
pub struct Mutation<I, O> {
  cache: QueryClient,
  descriptor: MutationDescriptor<I, O>,
  state: Arc<Mutex<MutationState<O>>>,
  changes: watch::Sender<u64>,
}

impl<I, O> Clone for Mutation<I, O> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      descriptor: self.descriptor.clone(),
      state: self.state.clone(),
      changes: self.changes.clone(),
    }
  }
}

impl<I: Clone + Send + 'static, O: Send + Sync + 'static> Mutation<I, O> {
  pub fn new(cache: QueryClient, descriptor: MutationDescriptor<I, O>) -> Self {
    let (changes, _rx) = watch::channel(0);
    Self {
      cache,
      descriptor,
      state: Arc::new(Mutex::new(MutationState::Idle)),
      changes,
    }
  }

  /// Run the mutation once.
  ///
  /// Fails with [`ClientError::MutationInFlight`] without touching the network
  /// if a previous call on this mutation has not finished.
  pub async fn mutate(&self, input: I) -> Result<Arc<O>, ClientError> {
    let name = self.descriptor.name;
    {
      let mut state = self.lock();
      if matches!(*state, MutationState::Pending) {
        debug!(mutation = name, "rejected, already pending");
        return Err(ClientError::MutationInFlight);
      }
      if let Some(validate) = &self.descriptor.validate {
        if let Err(e) = validate(&input) {
          *state = MutationState::Error(e.clone());
          drop(state);
          self.notify();
          return Err(e);
        }
      }
      *state = MutationState::Pending;
    }
    self.notify();

    let guard = PendingGuard { mutation: self };
    let result = (self.descriptor.run)(input.clone()).await;
    std::mem::forget(guard);

    match result {
      Ok(output) => {
        let output = Arc::new(output);
        let filters = self.descriptor.filters(&input, &output);
        debug!(mutation = name, filters = filters.len(), "mutation succeeded");
        self.cache.invalidate(&filters);
        self.set(MutationState::Success(output.clone()));
        Ok(output)
      }
      Err(e) => {
        warn!(mutation = name, error = %e, "mutation failed");
        self.set(MutationState::Error(e.clone()));
        Err(e)
      }
    }
  }

  pub fn state(&self) -> MutationState<O> {
    self.lock().clone()
  }

  pub fn is_pending(&self) -> bool {
    matches!(*self.lock(), MutationState::Pending)
  }

  pub fn is_success(&self) -> bool {
    matches!(*self.lock(), MutationState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(*self.lock(), MutationState::Error(_))
  }

  pub fn error(&self) -> Option<ClientError> {
    match &*self.lock() {
      MutationState::Error(e) => Some(e.clone()),
      _ => None,
    }
  }

  pub fn data(&self) -> Option<Arc<O>> {
    match &*self.lock() {
      MutationState::Success(output) => Some(output.clone()),
      _ => None,
    }
  }

  /// Back to idle, e.g. when a form is reopened. Ignored while pending.
  pub fn reset(&self) {
    let mut state = self.lock();
    if !matches!(*state, MutationState::Pending) {
      *state = MutationState::Idle;
      drop(state);
      self.notify();
    }
  }

  /// Receiver that ticks whenever the state changes.
  pub fn watch(&self) -> watch::Receiver<u64> {
    self.changes.subscribe()
  }
}

impl<I, O> Mutation<I, O> {
  fn lock(&self) -> MutexGuard<'_, MutationState<O>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set(&self, next: MutationState<O>) {
    *self.lock() = next;
    self.notify();
  }

  fn notify(&self) {
    self.changes.send_modify(|v| *v = v.wrapping_add(1));
  }
}

/// Returns a mutation to idle when its future is dropped mid-request.
struct PendingGuard<'a, I, O> {
  mutation: &'a Mutation<I, O>,
}

impl<I, O> Drop for PendingGuard<'_, I, O> {
  fn drop(&mut self) {
    self.mutation.set(MutationState::Idle);
  }
}
