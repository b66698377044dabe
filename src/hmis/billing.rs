//! Invoices. Amounts are integer cents throughout.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{HmisClient, Page};
use crate::api::{ClientError, ValidationErrors};
use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;

pub const INVOICES: &str = "billing/invoices";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
  Draft,
  Issued,
  PartiallyPaid,
  Paid,
  Overdue,
  Void,
}

impl InvoiceStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Draft => "Draft",
      Self::Issued => "Issued",
      Self::PartiallyPaid => "Partially paid",
      Self::Paid => "Paid",
      Self::Overdue => "Overdue",
      Self::Void => "Void",
    }
  }

  /// Whether a payment can still be taken against the invoice.
  pub fn is_payable(&self) -> bool {
    matches!(self, Self::Issued | Self::PartiallyPaid | Self::Overdue)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InvoiceLine {
  pub description: String,
  pub quantity: u32,
  pub unit_price_cents: i64,
}

/// Upper bound on a single line's unit price (10 million in major units).
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

impl InvoiceLine {
  /// Saturates instead of overflowing; `NewInvoice::validate` rejects prices
  /// large enough to get there.
  pub fn amount_cents(&self) -> i64 {
    self.unit_price_cents.saturating_mul(i64::from(self.quantity))
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Invoice {
  pub id: u64,
  pub number: String,
  pub patient_id: u64,
  #[serde(default)]
  pub patient_name: Option<String>,
  pub status: InvoiceStatus,
  #[serde(default)]
  pub lines: Vec<InvoiceLine>,
  pub total_cents: i64,
  pub balance_cents: i64,
  #[serde(default = "default_currency")]
  pub currency: String,
  #[serde(default)]
  pub issued_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
}

fn default_currency() -> String {
  "usd".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceFilter {
  pub status: Option<InvoiceStatus>,
  pub patient_id: Option<u64>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoice {
  pub patient_id: u64,
  pub lines: Vec<InvoiceLine>,
  pub due_date: Option<NaiveDate>,
}

impl NewInvoice {
  pub fn total_cents(&self) -> i64 {
    self
      .lines
      .iter()
      .map(InvoiceLine::amount_cents)
      .fold(0, i64::saturating_add)
  }

  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    if self.lines.is_empty() {
      errors.add("lines", "Add at least one line item");
    }
    for (i, line) in self.lines.iter().enumerate() {
      let field = format!("lines.{}", i);
      errors.require(&field, &line.description, "Description is required");
      if line.quantity == 0 {
        errors.add(field.as_str(), "Quantity must be at least 1");
      }
      if line.unit_price_cents < 0 {
        errors.add(field.as_str(), "Price cannot be negative");
      } else if line.unit_price_cents > MAX_UNIT_PRICE_CENTS {
        errors.add(field.as_str(), "Price is too large");
      }
    }
    errors.into_result()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
  #[serde(skip)]
  pub invoice_id: u64,
  pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoidInvoice {
  #[serde(skip)]
  pub invoice_id: u64,
  pub reason: String,
}

/// Format cents as `12.34`; negative amounts keep their sign.
pub fn format_cents(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

impl HmisClient {
  pub fn invoices(&self, filter: &InvoiceFilter) -> Result<Query<Page<Invoice>>, ClientError> {
    Ok(self.cache().subscribe(self.list_query(INVOICES, filter)?))
  }

  pub fn invoice(&self, id: u64) -> Query<Invoice> {
    self
      .cache()
      .subscribe(self.detail_query(format!("{}/{}", INVOICES, id)))
  }

  pub fn create_invoice(&self) -> Mutation<NewInvoice, Invoice> {
    self.bind(
      self
        .mutation("create_invoice", |api, input: NewInvoice| async move {
          api.post("/billing/invoices", &input).await
        })
        .validate(NewInvoice::validate)
        .invalidates([KeyFilter::resource(INVOICES)]),
    )
  }

  pub fn update_invoice_status(&self) -> Mutation<StatusChange, Invoice> {
    self.bind(
      self
        .mutation("update_invoice_status", |api, input: StatusChange| async move {
          api
            .patch(&format!("/billing/invoices/{}/status", input.invoice_id), &input)
            .await
        })
        .invalidates([KeyFilter::resource(INVOICES)]),
    )
  }

  pub fn void_invoice(&self) -> Mutation<VoidInvoice, Invoice> {
    self.bind(
      self
        .mutation("void_invoice", |api, input: VoidInvoice| async move {
          api
            .post(&format!("/billing/invoices/{}/void", input.invoice_id), &input)
            .await
        })
        .validate(|input: &VoidInvoice| {
          let mut errors = ValidationErrors::new();
          errors.require("reason", &input.reason, "A reason is required to void");
          errors.into_result()
        })
        .invalidates([KeyFilter::resource(INVOICES)]),
    )
  }
}
