//! Laboratory orders, the test catalog and critical results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HmisClient, Page};
use crate::api::{ClientError, ValidationErrors};
use crate::cache::{CacheKey, KeyFilter};
use crate::mutation::Mutation;
use crate::query::Query;

pub const ORDERS: &str = "laboratory/orders";
pub const CATALOG: &str = "laboratory/tests";
pub const CRITICAL_VALUES: &str = "laboratory/critical-values";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabOrderStatus {
  Pending,
  Collected,
  InProgress,
  Completed,
  Cancelled,
}

impl LabOrderStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Pending => "Pending",
      Self::Collected => "Collected",
      Self::InProgress => "In progress",
      Self::Completed => "Completed",
      Self::Cancelled => "Cancelled",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabPriority {
  Stat,
  Urgent,
  Routine,
}

impl LabPriority {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Stat => "STAT",
      Self::Urgent => "Urgent",
      Self::Routine => "Routine",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LabOrder {
  pub id: u64,
  pub patient_id: u64,
  #[serde(default)]
  pub patient_name: Option<String>,
  #[serde(default)]
  pub tests: Vec<String>,
  pub status: LabOrderStatus,
  pub priority: LabPriority,
  pub ordered_at: DateTime<Utc>,
  #[serde(default)]
  pub ordered_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LabTest {
  pub code: String,
  pub name: String,
  #[serde(default)]
  pub specimen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CriticalValue {
  pub id: u64,
  pub order_id: u64,
  pub patient_id: u64,
  #[serde(default)]
  pub patient_name: Option<String>,
  pub test_name: String,
  pub value: String,
  #[serde(default)]
  pub unit: Option<String>,
  pub reported_at: DateTime<Utc>,
  #[serde(default)]
  pub acknowledged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabOrderFilter {
  pub status: Option<LabOrderStatus>,
  pub patient_id: Option<u64>,
  pub priority: Option<LabPriority>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

impl LabOrderFilter {
  pub fn pending() -> Self {
    Self {
      status: Some(LabOrderStatus::Pending),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLabOrder {
  pub patient_id: u64,
  pub test_codes: Vec<String>,
  pub priority: LabPriority,
  pub clinical_notes: Option<String>,
}

impl NewLabOrder {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    if self.test_codes.iter().all(|code| code.trim().is_empty()) {
      errors.add("test_codes", "Select at least one test");
    }
    errors.into_result()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acknowledgement {
  #[serde(skip)]
  pub critical_value_id: u64,
  pub note: Option<String>,
}

/// Worklist order: STAT before urgent before routine, oldest first within each.
pub fn sort_worklist(orders: &mut [LabOrder]) {
  orders.sort_by(|a, b| {
    a.priority
      .cmp(&b.priority)
      .then_with(|| a.ordered_at.cmp(&b.ordered_at))
  });
}

impl HmisClient {
  pub fn lab_orders(&self, filter: &LabOrderFilter) -> Result<Query<Page<LabOrder>>, ClientError> {
    Ok(self.cache().subscribe(self.list_query(ORDERS, filter)?))
  }

  pub fn lab_order(&self, id: u64) -> Query<LabOrder> {
    self
      .cache()
      .subscribe(self.detail_query(format!("{}/{}", ORDERS, id)))
  }

  pub fn lab_catalog(&self) -> Query<Vec<LabTest>> {
    self.cache().subscribe(self.reference_query(CATALOG))
  }

  /// Unacknowledged critical results, polled.
  pub fn critical_values(&self) -> Query<Vec<CriticalValue>> {
    let descriptor = self
      .get_query(CacheKey::new(CRITICAL_VALUES), self.policy().list)
      .refetch_interval(self.policy().critical_values_poll);
    self.cache().subscribe(descriptor)
  }

  pub fn create_lab_order(&self) -> Mutation<NewLabOrder, LabOrder> {
    self.bind(
      self
        .mutation("create_lab_order", |api, input: NewLabOrder| async move {
          api.post("/laboratory/orders", &input).await
        })
        .validate(NewLabOrder::validate)
        .invalidates([KeyFilter::resource(ORDERS)]),
    )
  }

  pub fn acknowledge_critical_value(&self) -> Mutation<Acknowledgement, CriticalValue> {
    self.bind(
      self
        .mutation(
          "acknowledge_critical_value",
          |api, input: Acknowledgement| async move {
            api
              .post(
                &format!(
                  "/laboratory/critical-values/{}/acknowledge",
                  input.critical_value_id
                ),
                &input,
              )
              .await
          },
        )
        .invalidates([
          KeyFilter::resource(CRITICAL_VALUES),
          KeyFilter::resource(ORDERS),
        ]),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn order(id: u64, priority: LabPriority, minute: u32) -> LabOrder {
    LabOrder {
      id,
      patient_id: 1,
      patient_name: None,
      tests: vec!["CBC".to_string()],
      status: LabOrderStatus::Pending,
      priority,
      ordered_at: Utc.with_ymd_and_hms(2026, 5, 1, 8, minute, 0).unwrap(),
      ordered_by: None,
    }
  }

  #[test]
  fn test_worklist_puts_stat_first() {
    let mut orders = vec![
      order(1, LabPriority::Routine, 0),
      order(2, LabPriority::Stat, 30),
      order(3, LabPriority::Urgent, 10),
      order(4, LabPriority::Stat, 5),
    ];
    sort_worklist(&mut orders);
    let ids: Vec<u64> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![4, 2, 3, 1]);
  }

  #[test]
  fn test_empty_page_decodes() {
    let page: Page<LabOrder> = serde_json::from_str(r#"{"items": [], "total": 0}"#).unwrap();
    assert_eq!(page.len(), 0);
    assert_eq!(page.total, 0);
  }

  #[test]
  fn test_order_requires_a_test() {
    let order = NewLabOrder {
      patient_id: 1,
      test_codes: vec![" ".to_string()],
      priority: LabPriority::Routine,
      clinical_notes: None,
    };
    assert!(matches!(order.validate(), Err(ClientError::Validation(_))));
  }

  #[test]
  fn test_pending_filter_key() {
    let key = CacheKey::from_filter(ORDERS, &LabOrderFilter::pending()).unwrap();
    assert_eq!(key.to_string(), "laboratory/orders?status=pending");
  }
}
