//! Department dashboard counters.

use serde::{Deserialize, Serialize};

use super::HmisClient;
use crate::cache::CacheKey;
use crate::query::Query;

pub const STATS: &str = "dashboard/stats";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardStats {
  pub patients_today: u32,
  pub appointments_today: u32,
  pub ed_census: u32,
  pub ed_waiting: u32,
  pub pending_lab_orders: u32,
  pub unacknowledged_critical_values: u32,
  pub reports_awaiting_signature: u32,
  pub outstanding_balance_cents: i64,
}

impl HmisClient {
  /// Polled while mounted.
  pub fn dashboard_stats(&self) -> Query<DashboardStats> {
    let descriptor = self
      .get_query(CacheKey::new(STATS), self.policy().dashboard_poll)
      .refetch_interval(self.policy().dashboard_poll);
    self.cache().subscribe(descriptor)
  }
}
