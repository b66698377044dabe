//! Card payments through the payment provider.
//!
//! The client never sees card data. It asks the API for a payment intent,
//! hands the returned client secret to the provider's own UI, then confirms
//! the intent id with the API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::billing::INVOICES;
use super::HmisClient;
use crate::api::{ClientError, ValidationErrors};
use crate::cache::KeyFilter;
use crate::mutation::Mutation;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// One payment attempt.
///
/// Build it once when the payment form opens and resend the same value on
/// retry. A new attempt, even for the same amount on the same invoice, gets a
/// new key so partial payments are not collapsed into the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntentRequest {
  pub invoice_id: u64,
  pub amount_cents: i64,
  pub currency: String,
  #[serde(skip)]
  idempotency_key: String,
}

impl PaymentIntentRequest {
  pub fn new(invoice_id: u64, amount_cents: i64, currency: impl Into<String>) -> Self {
    Self {
      invoice_id,
      amount_cents,
      currency: currency.into(),
      idempotency_key: Uuid::new_v4().to_string(),
    }
  }

  /// Sent as [`IDEMPOTENCY_HEADER`]; fixed for the life of this attempt.
  pub fn idempotency_key(&self) -> &str {
    &self.idempotency_key
  }

  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    if self.amount_cents <= 0 {
      errors.add("amount_cents", "Amount must be greater than zero");
    }
    errors.require("currency", &self.currency, "Currency is required");
    errors.into_result()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentIntent {
  pub id: String,
  pub client_secret: String,
  pub amount_cents: i64,
  #[serde(default)]
  pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmPayment {
  pub payment_intent_id: String,
  pub invoice_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentConfirmation {
  pub invoice_id: u64,
  /// Provider status string, e.g. `succeeded`
  pub status: String,
}

impl PaymentConfirmation {
  pub fn outcome(&self) -> PaymentOutcome {
    PaymentOutcome::from_provider_status(&self.status)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
  Succeeded,
  /// Customer must complete an extra step (3-D Secure and similar)
  RequiresAction,
  Failed,
}

impl PaymentOutcome {
  /// Map a provider status; anything not recognised counts as a failure.
  pub fn from_provider_status(status: &str) -> Self {
    match status {
      "succeeded" => Self::Succeeded,
      "requires_action" | "requires_confirmation" | "processing" => Self::RequiresAction,
      _ => Self::Failed,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Succeeded => "Payment received",
      Self::RequiresAction => "Waiting for customer action",
      Self::Failed => "Payment failed",
    }
  }
}

impl HmisClient {
  pub fn create_payment_intent(&self) -> Mutation<PaymentIntentRequest, PaymentIntent> {
    self.bind(
      self
        .mutation(
          "create_payment_intent",
          |api, input: PaymentIntentRequest| async move {
            api
              .post_with_headers(
                "/payments/stripe/create-intent",
                &input,
                &[(IDEMPOTENCY_HEADER, input.idempotency_key())],
              )
              .await
          },
        )
        .validate(PaymentIntentRequest::validate),
    )
  }

  pub fn confirm_payment(&self) -> Mutation<ConfirmPayment, PaymentConfirmation> {
    self.bind(
      self
        .mutation("confirm_payment", |api, input: ConfirmPayment| async move {
          api.post("/payments/stripe/confirm", &input).await
        })
        .invalidates([KeyFilter::resource(INVOICES)]),
    )
  }
}
