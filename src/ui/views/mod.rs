mod critical_values;
mod lab_worklist;
mod track_board;

pub use critical_values::CriticalValuesView;
pub use lab_worklist::LabWorklistView;
pub use track_board::TrackBoardView;

#[cfg(test)]
pub(crate) mod testing {
  use async_trait::async_trait;
  use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
  use hmis_sync::api::{HttpRequest, HttpResponse, NetworkError, Transport};
  use hmis_sync::{ApiClient, AuthContext, HmisClient, QueryClient, Session};
  use serde_json::Value;
  use std::sync::{Arc, Mutex};

  /// Answers by URL path; unknown paths get a 404.
  pub struct StaticTransport {
    routes: Vec<(String, u16, Value)>,
    pub requests: Mutex<Vec<HttpRequest>>,
  }

  #[async_trait]
  impl Transport for StaticTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
      let path = request
        .url
        .trim_start_matches("http://hmis.test/api/v1/")
        .split('?')
        .next()
        .unwrap_or("")
        .to_string();
      self.requests.lock().unwrap().push(request);

      let response = match self.routes.iter().find(|(route, _, _)| *route == path) {
        Some((_, status, body)) => HttpResponse {
          status: *status,
          body: serde_json::to_vec(body).unwrap(),
        },
        None => HttpResponse {
          status: 404,
          body: br#"{"detail": "Not found"}"#.to_vec(),
        },
      };
      Ok(response)
    }
  }

  pub fn client_with(routes: &[(&str, Value)]) -> HmisClient {
    client_and_transport(routes).0
  }

  pub fn client_and_transport(routes: &[(&str, Value)]) -> (HmisClient, Arc<StaticTransport>) {
    let routes: Vec<(&str, u16, Value)> = routes
      .iter()
      .map(|(path, body)| (*path, 200, body.clone()))
      .collect();
    client_with_status(&routes)
  }

  pub fn client_with_status(routes: &[(&str, u16, Value)]) -> (HmisClient, Arc<StaticTransport>) {
    let transport = Arc::new(StaticTransport {
      routes: routes
        .iter()
        .map(|(path, status, body)| (path.to_string(), *status, body.clone()))
        .collect(),
      requests: Mutex::new(Vec::new()),
    });
    let auth = AuthContext::with_session(Session {
      access_token: "token".to_string(),
      tenant_id: "north".to_string(),
      user: Some("charge.nurse@example.org".to_string()),
    });
    let api = ApiClient::new("http://hmis.test/api/v1", transport.clone(), auth);
    (HmisClient::new(api, QueryClient::new()), transport)
  }

  pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }
}
