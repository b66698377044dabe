use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{ApiError, ClientError, Result};
use super::params::QueryParams;
use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::auth::AuthContext;

pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// JSON client for the HMIS REST API.
///
/// Attaches the bearer token and tenant header from the injected
/// [`AuthContext`] and turns failures into [`ClientError`]s. It neither caches
/// nor retries; that belongs to the query layer and the caller respectively.
#[derive(Clone)]
pub struct ApiClient {
  base_url: String,
  transport: Arc<dyn Transport>,
  auth: AuthContext,
}

impl ApiClient {
  /// `base_url` includes the API prefix, e.g. `https://hmis.example.org/api/v1`.
  pub fn new(base_url: &str, transport: Arc<dyn Transport>, auth: AuthContext) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      transport,
      auth,
    }
  }

  pub fn auth(&self) -> &AuthContext {
    &self.auth
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &QueryParams) -> Result<T> {
    self.send(Method::Get, path, params, None, &[]).await
  }

  pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let body = serde_json::to_vec(body)?;
    self
      .send(Method::Post, path, &QueryParams::new(), Some(body), &[])
      .await
  }

  /// POST with no request body, for action endpoints like `/sign`.
  pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    self
      .send(Method::Post, path, &QueryParams::new(), None, &[])
      .await
  }

  /// POST with extra request headers (e.g. `Idempotency-Key`).
  pub async fn post_with_headers<T, B>(
    &self,
    path: &str,
    body: &B,
    headers: &[(&str, &str)],
  ) -> Result<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let body = serde_json::to_vec(body)?;
    self
      .send(Method::Post, path, &QueryParams::new(), Some(body), headers)
      .await
  }

  pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let body = serde_json::to_vec(body)?;
    self
      .send(Method::Patch, path, &QueryParams::new(), Some(body), &[])
      .await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    self
      .send(Method::Delete, path, &QueryParams::new(), None, &[])
      .await
  }

  async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    params: &QueryParams,
    body: Option<Vec<u8>>,
    extra_headers: &[(&str, &str)],
  ) -> Result<T> {
    let request = self.build_request(method, path, params, body, extra_headers);

    let response = match self.transport.execute(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(%method, path, timed_out = e.timed_out, "request failed without a response");
        return Err(e.into());
      }
    };

    debug!(%method, path, status = response.status, "api response");

    if !response.is_success() {
      return Err(parse_api_error(&response).into());
    }

    decode_body(&response.body)
  }

  fn build_request(
    &self,
    method: Method,
    path: &str,
    params: &QueryParams,
    body: Option<Vec<u8>>,
    extra_headers: &[(&str, &str)],
  ) -> HttpRequest {
    let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
    if !params.is_empty() {
      url.push('?');
      url.push_str(&params.to_query_string());
    }

    let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
    if body.is_some() {
      headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }
    if let Some(session) = self.auth.get() {
      headers.push((
        "Authorization".to_string(),
        format!("Bearer {}", session.access_token),
      ));
      headers.push((TENANT_HEADER.to_string(), session.tenant_id));
    }
    for (name, value) in extra_headers {
      headers.push((name.to_string(), value.to_string()));
    }

    HttpRequest {
      method,
      url,
      headers,
      body,
    }
  }
}

/// Decode a 2xx body. An empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
  let value = if body.iter().all(u8::is_ascii_whitespace) {
    Value::Null
  } else {
    serde_json::from_slice(body)?
  };
  serde_json::from_value(value).map_err(ClientError::from)
}

/// Build an [`ApiError`] from a non-2xx response.
///
/// `detail` may be a plain string or a list of `{loc, msg}` field errors;
/// anything else falls back to a generic message.
pub fn parse_api_error(response: &HttpResponse) -> ApiError {
  let body: Option<Value> = serde_json::from_slice(&response.body).ok();

  let detail = body
    .as_ref()
    .and_then(|b| b.get("detail"))
    .and_then(|detail| match detail {
      Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
      Value::Array(items) => {
        let messages: Vec<&str> = items
          .iter()
          .filter_map(|item| item.get("msg").and_then(Value::as_str))
          .collect();
        (!messages.is_empty()).then(|| messages.join("; "))
      }
      _ => None,
    })
    .unwrap_or_else(|| ApiError::generic_detail(response.status));

  let code = body
    .as_ref()
    .and_then(|b| b.get("code"))
    .and_then(Value::as_str)
    .map(String::from);

  ApiError {
    status: response.status,
    detail,
    code,
  }
}
