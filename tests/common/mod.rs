#![allow(dead_code)]

use async_trait::async_trait;
use hmis_sync::api::{HttpRequest, HttpResponse, Method, NetworkError, ReqwestTransport, Transport};
use hmis_sync::{ApiClient, AuthContext, HmisClient, QueryClient, Session};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

pub const TOKEN: &str = "test-token";
pub const TENANT: &str = "general-hospital";

pub fn session() -> Session {
  Session {
    access_token: TOKEN.to_string(),
    tenant_id: TENANT.to_string(),
    user: Some("dr.lee@example.org".to_string()),
  }
}

pub fn api_base(server: &MockServer) -> String {
  format!("{}/api/v1", server.uri())
}

/// Signed-in client talking to the mock server over real HTTP.
pub fn signed_in_client(server: &MockServer) -> HmisClient {
  client_with_auth(server, AuthContext::with_session(session()))
}

pub fn client_with_auth(server: &MockServer, auth: AuthContext) -> HmisClient {
  let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
  let api = ApiClient::new(&api_base(server), Arc::new(transport), auth);
  HmisClient::new(api, QueryClient::new())
}

/// In-memory transport that counts calls and can hold responses back until
/// released, for exercising de-duplication without a server.
pub struct CountingTransport {
  calls: AtomicUsize,
  requests: Mutex<Vec<HttpRequest>>,
  body: Mutex<Vec<u8>>,
  status: u16,
  gate: tokio::sync::Semaphore,
}

impl CountingTransport {
  /// Responds immediately with `body`.
  pub fn new(body: serde_json::Value) -> Arc<Self> {
    Self::build(200, body, tokio::sync::Semaphore::MAX_PERMITS)
  }

  pub fn with_status(status: u16, body: serde_json::Value) -> Arc<Self> {
    Self::build(status, body, tokio::sync::Semaphore::MAX_PERMITS)
  }

  /// Holds every response until [`release`](Self::release) is called.
  pub fn gated(body: serde_json::Value) -> Arc<Self> {
    Self::build(200, body, 0)
  }

  fn build(status: u16, body: serde_json::Value, permits: usize) -> Arc<Self> {
    Arc::new(Self {
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new()),
      body: Mutex::new(serde_json::to_vec(&body).unwrap()),
      status,
      gate: tokio::sync::Semaphore::new(permits),
    })
  }

  pub fn release(&self, responses: usize) {
    self.gate.add_permits(responses);
  }

  pub fn set_body(&self, body: serde_json::Value) {
    *self.body.lock().unwrap() = serde_json::to_vec(&body).unwrap();
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn urls(&self) -> Vec<String> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .map(|r| r.url.clone())
      .collect()
  }

  /// URLs of GET requests only, in the order they were sent.
  pub fn gets(&self) -> Vec<String> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == Method::Get)
      .map(|r| r.url.clone())
      .collect()
  }

  pub fn client(self: &Arc<Self>) -> HmisClient {
    let api = ApiClient::new(
      "http://hmis.test/api/v1",
      self.clone(),
      AuthContext::with_session(session()),
    );
    HmisClient::new(api, QueryClient::new())
  }
}

#[async_trait]
impl Transport for CountingTransport {
  async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(request);
    let permit = self
      .gate
      .acquire()
      .await
      .map_err(|_| NetworkError::new("transport closed"))?;
    permit.forget();
    Ok(HttpResponse {
      status: self.status,
      body: self.body.lock().unwrap().clone(),
    })
  }
}

/// Let spawned fetch tasks run to completion.
pub async fn settle() {
  for _ in 0..20 {
    tokio::task::yield_now().await;
  }
}
