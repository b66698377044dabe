//! Signed-in session state shared by the transport client and the views.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Credentials attached to every API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub tenant_id: String,
  /// Display name or email of the signed-in user
  #[serde(default)]
  pub user: Option<String>,
}

/// Explicit, injectable holder for the current session.
///
/// Cloning is cheap and every clone observes the same state. Subscribers are
/// notified whenever the session is set or cleared.
#[derive(Debug, Clone)]
pub struct AuthContext {
  tx: Arc<watch::Sender<Option<Session>>>,
}

impl AuthContext {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(None);
    Self { tx: Arc::new(tx) }
  }

  pub fn with_session(session: Session) -> Self {
    let ctx = Self::new();
    ctx.set(session);
    ctx
  }

  pub fn get(&self) -> Option<Session> {
    self.tx.borrow().clone()
  }

  pub fn is_signed_in(&self) -> bool {
    self.tx.borrow().is_some()
  }

  pub fn set(&self, session: Session) {
    self.tx.send_replace(Some(session));
  }

  pub fn clear(&self) {
    self.tx.send_replace(None);
  }

  /// Receive the current session and every later change.
  pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
    self.tx.subscribe()
  }
}

impl Default for AuthContext {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session() -> Session {
    Session {
      access_token: "tok".to_string(),
      tenant_id: "general-hospital".to_string(),
      user: Some("dr.lee@example.org".to_string()),
    }
  }

  #[test]
  fn test_set_get_clear() {
    let ctx = AuthContext::new();
    assert!(ctx.get().is_none());

    ctx.set(session());
    assert_eq!(ctx.get(), Some(session()));

    ctx.clear();
    assert!(!ctx.is_signed_in());
  }

  #[test]
  fn test_clones_share_state() {
    let ctx = AuthContext::new();
    let other = ctx.clone();
    ctx.set(session());
    assert!(other.is_signed_in());
  }

  #[tokio::test]
  async fn test_subscribers_see_sign_out() {
    let ctx = AuthContext::with_session(session());
    let mut rx = ctx.subscribe();
    assert!(rx.borrow_and_update().is_some());

    ctx.clear();
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_none());
  }
}
