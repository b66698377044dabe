//! HMIS resources exposed as queries and mutations.
//!
//! Each area module adds its hooks to [`HmisClient`] in its own `impl` block.

pub mod appointments;
pub mod billing;
pub mod cds;
pub mod dashboard;
pub mod emergency;
pub mod laboratory;
pub mod patients;
pub mod payments;
pub mod prescriptions;
pub mod radiology;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::api::{ApiClient, ClientError, ValidationErrors};
use crate::auth::{AuthContext, Session};
use crate::cache::{CacheKey, QueryClient};
use crate::mutation::{Mutation, MutationDescriptor};
use crate::query::QueryDescriptor;

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  #[serde(default = "first_page")]
  pub page: u32,
  #[serde(default)]
  pub page_size: u32,
}

fn first_page() -> u32 {
  1
}

impl<T> Page<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// How long each class of data stays fresh and how often boards poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePolicy {
  /// Paginated lists and detail records
  pub list: Duration,
  /// Provider directory, lab test catalog
  pub reference: Duration,
  pub track_board_poll: Duration,
  pub critical_values_poll: Duration,
  pub dashboard_poll: Duration,
}

impl Default for StalePolicy {
  fn default() -> Self {
    Self {
      list: Duration::from_secs(30),
      reference: Duration::from_secs(30 * 60),
      track_board_poll: Duration::from_secs(15),
      critical_values_poll: Duration::from_secs(30),
      dashboard_poll: Duration::from_secs(60),
    }
  }
}

/// Sign-in request body
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tenant_id: Option<String>,
}

impl Credentials {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    errors.require("email", &self.email, "Email is required");
    errors.require("password", &self.password, "Password is required");
    errors.into_result()
  }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
  access_token: String,
  #[serde(default)]
  tenant_id: Option<String>,
  #[serde(default)]
  user: Option<String>,
}

/// Entry point for every resource hook.
///
/// Cloning is cheap: all clones share the same HTTP client, auth context
/// and cache.
#[derive(Clone)]
pub struct HmisClient {
  api: ApiClient,
  cache: QueryClient,
  policy: StalePolicy,
  default_tenant: Option<String>,
}

impl HmisClient {
  pub fn new(api: ApiClient, cache: QueryClient) -> Self {
    Self {
      api,
      cache,
      policy: StalePolicy::default(),
      default_tenant: None,
    }
  }

  pub fn with_policy(mut self, policy: StalePolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Tenant used at sign-in when neither the credentials nor the server name one.
  pub fn with_default_tenant(mut self, tenant_id: Option<String>) -> Self {
    self.default_tenant = tenant_id;
    self
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  pub fn auth(&self) -> &AuthContext {
    self.api.auth()
  }

  pub fn policy(&self) -> &StalePolicy {
    &self.policy
  }

  /// Exchange credentials for a session and store it in the auth context.
  ///
  /// Anything cached under a previous session is dropped first.
  pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ClientError> {
    credentials.validate()?;
    let response: LoginResponse = self.api.post("/auth/login", credentials).await?;

    let tenant_id = response
      .tenant_id
      .or_else(|| credentials.tenant_id.clone())
      .or_else(|| self.default_tenant.clone());
    let Some(tenant_id) = tenant_id else {
      let mut errors = ValidationErrors::new();
      errors.add("tenant_id", "Tenant is required");
      return Err(errors.into());
    };

    let session = Session {
      access_token: response.access_token,
      tenant_id,
      user: response.user.or_else(|| Some(credentials.email.clone())),
    };
    self.cache.clear();
    self.auth().set(session.clone());
    // Views still mounted load again under the new session
    self.cache.refetch_subscribed();
    info!(tenant = %session.tenant_id, "signed in");
    Ok(session)
  }

  /// Forget the session and every cached record.
  pub fn sign_out(&self) {
    self.auth().clear();
    self.cache.clear();
    info!("signed out");
  }

  /// GET `/{resource}` with the key's parameters, refusing to run signed out.
  fn get_query<T>(&self, key: CacheKey, stale_time: Duration) -> QueryDescriptor<T>
  where
    T: DeserializeOwned + Send + Sync + 'static,
  {
    let api = self.api.clone();
    let path = format!("/{}", key.resource());
    let params = key.params().clone();
    QueryDescriptor::new(key, move || {
      let api = api.clone();
      let path = path.clone();
      let params = params.clone();
      async move {
        if !api.auth().is_signed_in() {
          return Err(ClientError::NotSignedIn);
        }
        api.get(&path, &params).await
      }
    })
    .stale_time(stale_time)
  }

  fn list_query<T, F>(&self, resource: &str, filter: &F) -> Result<QueryDescriptor<T>, ClientError>
  where
    T: DeserializeOwned + Send + Sync + 'static,
    F: Serialize + ?Sized,
  {
    let key = CacheKey::from_filter(resource, filter)?;
    Ok(self.get_query(key, self.policy.list))
  }

  fn detail_query<T>(&self, resource: String) -> QueryDescriptor<T>
  where
    T: DeserializeOwned + Send + Sync + 'static,
  {
    self.get_query(CacheKey::new(resource), self.policy.list)
  }

  fn reference_query<T>(&self, resource: &str) -> QueryDescriptor<T>
  where
    T: DeserializeOwned + Send + Sync + 'static,
  {
    self.get_query(CacheKey::new(resource), self.policy.reference)
  }

  /// Bind a mutation whose request runs against a clone of the API client.
  fn mutation<I, O, F, Fut>(&self, name: &'static str, run: F) -> MutationDescriptor<I, O>
  where
    I: Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(ApiClient, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ClientError>> + Send + 'static,
  {
    let api = self.api.clone();
    MutationDescriptor::new(name, move |input| {
      let signed_in = api.auth().is_signed_in();
      let request = run(api.clone(), input);
      async move {
        if !signed_in {
          return Err(ClientError::NotSignedIn);
        }
        request.await
      }
    })
  }

  fn bind<I, O>(&self, descriptor: MutationDescriptor<I, O>) -> Mutation<I, O>
  where
    I: Clone + Send + 'static,
    O: Send + Sync + 'static,
  {
    Mutation::new(self.cache.clone(), descriptor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_page_defaults_when_server_omits_paging() {
    let page: Page<u32> = serde_json::from_str(r#"{"items": [], "total": 0}"#).unwrap();
    assert!(page.is_empty());
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 0);
  }

  #[test]
  fn test_stale_policy_defaults() {
    let policy = StalePolicy::default();
    assert_eq!(policy.list, Duration::from_secs(30));
    assert_eq!(policy.reference, Duration::from_secs(1800));
    assert_eq!(policy.track_board_poll, Duration::from_secs(15));
    assert_eq!(policy.critical_values_poll, Duration::from_secs(30));
    assert_eq!(policy.dashboard_poll, Duration::from_secs(60));
  }

  #[test]
  fn test_credentials_require_email_and_password() {
    let credentials = Credentials {
      email: " ".to_string(),
      password: String::new(),
      tenant_id: None,
    };
    let Err(ClientError::Validation(errors)) = credentials.validate() else {
      panic!("expected validation errors");
    };
    assert_eq!(errors.field("email"), ["Email is required"]);
    assert_eq!(errors.field("password"), ["Password is required"]);
  }
}
