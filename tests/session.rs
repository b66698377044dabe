mod common;

use chrono::NaiveDate;
use common::{client_with_auth, session, signed_in_client, TENANT};
use hmis_sync::hmis::patients::{NewPatient, PatientFilter};
use hmis_sync::hmis::payments::{PaymentIntentRequest, IDEMPOTENCY_HEADER};
use hmis_sync::hmis::Credentials;
use hmis_sync::{AuthContext, ClientError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials(tenant_id: Option<&str>) -> Credentials {
  Credentials {
    email: "dr.lee@example.org".to_string(),
    password: "correct horse".to_string(),
    tenant_id: tenant_id.map(String::from),
  }
}

async fn mock_login(server: &MockServer, response: serde_json::Value) {
  Mock::given(method("POST"))
    .and(path("/api/v1/auth/login"))
    .respond_with(ResponseTemplate::new(200).set_body_json(response))
    .mount(server)
    .await;
}

#[tokio::test]
async fn test_sign_in_stores_session_used_by_later_requests() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/auth/login"))
    .and(body_json(json!({
      "email": "dr.lee@example.org",
      "password": "correct horse",
      "tenant_id": "st-marys"
    })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access_token": "fresh-token",
      "tenant_id": "st-marys",
      "user": "Dr Lee"
    })))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/v1/providers"))
    .and(header("Authorization", "Bearer fresh-token"))
    .and(header("X-Tenant-ID", "st-marys"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
    .expect(1)
    .mount(&server)
    .await;

  let client = client_with_auth(&server, AuthContext::new());
  let session = client.sign_in(&credentials(Some("st-marys"))).await.unwrap();
  assert_eq!(session.user.as_deref(), Some("Dr Lee"));
  assert_eq!(client.auth().get(), Some(session));

  client.providers().load().await.unwrap();
}

#[tokio::test]
async fn test_sign_in_drops_previous_session_cache() {
  let server = MockServer::start().await;
  mock_login(&server, json!({"access_token": "other", "tenant_id": "st-marys"})).await;
  Mock::given(method("GET"))
    .and(path("/api/v1/patients"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
    .mount(&server)
    .await;

  let client = signed_in_client(&server);
  let query = client.patients(&PatientFilter::page(1, 10)).unwrap();
  query.load().await.unwrap();
  assert!(query.data().is_some());

  client.sign_in(&credentials(None)).await.unwrap();
  assert!(query.data().is_none());
  assert_eq!(client.auth().get().unwrap().tenant_id, "st-marys");
}

#[tokio::test]
async fn test_sign_in_reloads_mounted_queries_under_new_session() {
  let server = MockServer::start().await;
  mock_login(&server, json!({"access_token": "other", "tenant_id": "st-marys"})).await;
  Mock::given(method("GET"))
    .and(path("/api/v1/patients"))
    .and(header("Authorization", "Bearer other"))
    .and(header("X-Tenant-ID", "st-marys"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 3})))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/v1/patients"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
    .mount(&server)
    .await;

  let client = signed_in_client(&server);
  let mut query = client.patients(&PatientFilter::page(1, 10)).unwrap();
  assert_eq!(query.load().await.unwrap().total, 0);

  client.sign_in(&credentials(None)).await.unwrap();
  // No load() here: the mounted handle fills on its own
  tokio::time::timeout(Duration::from_secs(5), async {
    while query.data().map(|page| page.total) != Some(3) {
      assert!(query.changed().await);
    }
  })
  .await
  .unwrap();
}

#[tokio::test]
async fn test_tenant_falls_back_to_credentials_then_default() {
  let server = MockServer::start().await;
  mock_login(&server, json!({"access_token": "t"})).await;

  let client = client_with_auth(&server, AuthContext::new());
  let from_credentials = client.sign_in(&credentials(Some("st-marys"))).await.unwrap();
  assert_eq!(from_credentials.tenant_id, "st-marys");
  // No user in the response, so the email stands in
  assert_eq!(from_credentials.user.as_deref(), Some("dr.lee@example.org"));

  let client =
    client_with_auth(&server, AuthContext::new()).with_default_tenant(Some(TENANT.to_string()));
  let from_config = client.sign_in(&credentials(None)).await.unwrap();
  assert_eq!(from_config.tenant_id, TENANT);
}

#[tokio::test]
async fn test_sign_in_without_any_tenant_fails() {
  let server = MockServer::start().await;
  mock_login(&server, json!({"access_token": "t"})).await;

  let client = client_with_auth(&server, AuthContext::new());
  let Err(ClientError::Validation(errors)) = client.sign_in(&credentials(None)).await else {
    panic!("expected a validation error");
  };
  assert_eq!(errors.field("tenant_id"), ["Tenant is required"]);
  assert!(!client.auth().is_signed_in());
}

#[tokio::test]
async fn test_rejected_login_surfaces_detail() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/auth/login"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid email or password"})))
    .mount(&server)
    .await;

  let client = client_with_auth(&server, AuthContext::new());
  let err = client.sign_in(&credentials(Some("st-marys"))).await.unwrap_err();
  assert!(err.api().unwrap().is_unauthorized());
  assert_eq!(err.user_message(), "Invalid email or password");
  assert!(!client.auth().is_signed_in());
}

#[tokio::test]
async fn test_blank_credentials_never_reach_the_server() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/auth/login"))
    .respond_with(ResponseTemplate::new(200))
    .expect(0)
    .mount(&server)
    .await;

  let client = client_with_auth(&server, AuthContext::new());
  let mut blank = credentials(Some("st-marys"));
  blank.password = String::new();
  assert!(matches!(
    client.sign_in(&blank).await,
    Err(ClientError::Validation(_))
  ));
}

#[tokio::test]
async fn test_signed_out_hooks_do_not_call_the_api() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
    .expect(0)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(201))
    .expect(0)
    .mount(&server)
    .await;

  let client = client_with_auth(&server, AuthContext::new());
  let query = client.patients(&PatientFilter::page(1, 10)).unwrap();
  assert_eq!(query.load().await.unwrap_err(), ClientError::NotSignedIn);

  let create = client.create_patient();
  let err = create
    .mutate(NewPatient {
      first_name: "Ada".to_string(),
      last_name: "Lovelace".to_string(),
      date_of_birth: NaiveDate::from_ymd_opt(1980, 12, 10),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert_eq!(err, ClientError::NotSignedIn);
}

#[tokio::test]
async fn test_sign_out_notifies_subscribers() {
  let server = MockServer::start().await;
  let client = signed_in_client(&server);
  let mut sessions = client.auth().subscribe();
  assert_eq!(*sessions.borrow_and_update(), Some(session()));

  client.sign_out();
  sessions.changed().await.unwrap();
  assert_eq!(*sessions.borrow(), None);
  assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_payment_attempts_carry_their_own_idempotency_key() {
  let intent = json!({
    "id": "pi_123",
    "client_secret": "pi_123_secret",
    "amount_cents": 4550,
    "status": "requires_payment_method"
  });
  let first_attempt = PaymentIntentRequest::new(1201, 4_550, "USD");
  let second_attempt = PaymentIntentRequest::new(1201, 4_550, "USD");
  assert_ne!(first_attempt.idempotency_key(), second_attempt.idempotency_key());

  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/payments/stripe/create-intent"))
    .and(header(IDEMPOTENCY_HEADER, first_attempt.idempotency_key()))
    .and(body_json(json!({"invoice_id": 1201, "amount_cents": 4550, "currency": "USD"})))
    .respond_with(ResponseTemplate::new(200).set_body_json(intent.clone()))
    .expect(2)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/api/v1/payments/stripe/create-intent"))
    .and(header(IDEMPOTENCY_HEADER, second_attempt.idempotency_key()))
    .respond_with(ResponseTemplate::new(200).set_body_json(intent))
    .expect(1)
    .mount(&server)
    .await;

  let client = signed_in_client(&server);
  let create = client.create_payment_intent();
  create.mutate(first_attempt.clone()).await.unwrap();
  // A retried attempt reuses its key
  create.mutate(first_attempt).await.unwrap();
  // A separate partial payment of the same amount does not
  create.mutate(second_attempt).await.unwrap();
}
