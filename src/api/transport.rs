//! Raw HTTP seam beneath the API client.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use super::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A fully resolved request: absolute URL, headers, optional JSON body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl HttpRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Sends requests over the wire. Fails only when no response was received;
/// any status code, including 5xx, is a successful exchange at this level.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("hmis-sync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| NetworkError::new(format!("failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder.send().await.map_err(into_network_error)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(into_network_error)?;

    Ok(HttpResponse {
      status,
      body: body.to_vec(),
    })
  }
}

fn into_network_error(e: reqwest::Error) -> NetworkError {
  if e.is_timeout() {
    NetworkError::timeout(e.to_string())
  } else {
    NetworkError::new(e.to_string())
  }
}
