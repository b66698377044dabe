//! Error types for the HMIS API client.
//!
//! Every variant is `Clone` so a single de-duplicated fetch can hand the same
//! failure to each subscriber waiting on it.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Server answered with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail} (HTTP {status})")]
pub struct ApiError {
  /// HTTP status code
  pub status: u16,
  /// Message taken from the response body's `detail` field, or a generic fallback
  pub detail: String,
  /// Machine-readable error code, when the server sends one
  pub code: Option<String>,
}

impl ApiError {
  pub fn new(status: u16, detail: impl Into<String>) -> Self {
    Self {
      status,
      detail: detail.into(),
      code: None,
    }
  }

  /// Fallback message used when the body carries no usable `detail`.
  pub fn generic_detail(status: u16) -> String {
    format!("Request failed with status {}", status)
  }

  pub fn is_unauthorized(&self) -> bool {
    self.status == 401
  }
}

/// The request never reached the server, or no response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error: {message}")]
pub struct NetworkError {
  pub message: String,
  pub timed_out: bool,
}

impl NetworkError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      timed_out: false,
    }
  }

  pub fn timeout(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      timed_out: true,
    }
  }
}

/// Field-level problems found before submission. Never sent to the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
  fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
    self
      .fields
      .entry(field.into())
      .or_default()
      .push(message.into());
  }

  /// Add `message` for `field` when `value` is blank.
  pub fn require(&mut self, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
      self.add(field, message);
    }
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn field(&self, field: &str) -> &[String] {
    self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
    self
      .fields
      .iter()
      .map(|(name, messages)| (name.as_str(), messages.as_slice()))
  }

  /// `Ok(())` when nothing was recorded, otherwise the collected errors.
  pub fn into_result(self) -> Result<(), ClientError> {
    if self.is_empty() {
      Ok(())
    } else {
      Err(ClientError::Validation(self))
    }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self
      .fields
      .iter()
      .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
      .collect();
    write!(f, "invalid input ({})", parts.join("; "))
  }
}

impl std::error::Error for ValidationErrors {}

/// Any failure surfaced by the client, cache, or mutation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
  #[error(transparent)]
  Network(#[from] NetworkError),

  #[error(transparent)]
  Api(#[from] ApiError),

  /// 2xx response whose body did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error(transparent)]
  Validation(#[from] ValidationErrors),

  /// A request could not be built from its inputs, e.g. a filter that does
  /// not serialize to a flat object
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The cache was asked for something it was never set up to serve
  #[error("internal client error: {0}")]
  Internal(String),

  /// A mutation was triggered again while its previous call was pending
  #[error("a previous submission is still pending")]
  MutationInFlight,

  #[error("not signed in")]
  NotSignedIn,

  /// The clinical safety check has not cleared and was not overridden
  #[error("safety check not resolved")]
  SafetyCheckPending,
}

impl ClientError {
  /// Network failures can be retried as-is. Everything else needs the input
  /// or the situation to change first.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network(_))
  }

  pub fn api(&self) -> Option<&ApiError> {
    match self {
      Self::Api(e) => Some(e),
      _ => None,
    }
  }

  pub fn status(&self) -> Option<u16> {
    self.api().map(|e| e.status)
  }

  /// Text suitable for an inline error panel or toast.
  pub fn user_message(&self) -> String {
    match self {
      Self::Network(e) if e.timed_out => {
        "The server took too long to respond. Please retry.".to_string()
      }
      Self::Network(_) => "Could not reach the server. Check your connection and retry.".to_string(),
      Self::Api(e) => e.detail.clone(),
      Self::Decode(_) => "The server sent an unexpected response.".to_string(),
      Self::Validation(e) => e.to_string(),
      Self::InvalidRequest(_) | Self::Internal(_) => {
        "Something went wrong preparing the request.".to_string()
      }
      Self::MutationInFlight => "Already submitting, please wait.".to_string(),
      Self::NotSignedIn => "Your session has ended. Please sign in again.".to_string(),
      Self::SafetyCheckPending => {
        "Review the safety alerts or confirm an override before submitting.".to_string()
      }
    }
  }
}

impl From<serde_json::Error> for ClientError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
