//! Radiology reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HmisClient, Page};
use crate::api::{ClientError, ValidationErrors};
use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;

pub const REPORTS: &str = "radiology/reports";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
  Draft,
  Preliminary,
  Final,
  Amended,
}

impl ReportStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Draft => "Draft",
      Self::Preliminary => "Preliminary",
      Self::Final => "Final",
      Self::Amended => "Amended",
    }
  }

  /// Only signed reports can be amended.
  pub fn is_signed(&self) -> bool {
    matches!(self, Self::Final | Self::Amended)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RadiologyReport {
  pub id: u64,
  pub patient_id: u64,
  #[serde(default)]
  pub patient_name: Option<String>,
  pub modality: String,
  #[serde(default)]
  pub study_description: Option<String>,
  pub status: ReportStatus,
  #[serde(default)]
  pub findings: Option<String>,
  #[serde(default)]
  pub impression: Option<String>,
  #[serde(default)]
  pub radiologist: Option<String>,
  #[serde(default)]
  pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportFilter {
  pub status: Option<ReportStatus>,
  pub patient_id: Option<u64>,
  pub modality: Option<String>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amendment {
  #[serde(skip)]
  pub report_id: u64,
  pub reason: String,
  pub findings: Option<String>,
  pub impression: Option<String>,
}

impl Amendment {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    errors.require("reason", &self.reason, "An amendment needs a reason");
    if self.findings.is_none() && self.impression.is_none() {
      errors.add("findings", "Change the findings or the impression");
    }
    errors.into_result()
  }
}

fn report_resource(id: u64) -> String {
  format!("{}/{}", REPORTS, id)
}

impl HmisClient {
  pub fn radiology_reports(
    &self,
    filter: &ReportFilter,
  ) -> Result<Query<Page<RadiologyReport>>, ClientError> {
    Ok(self.cache().subscribe(self.list_query(REPORTS, filter)?))
  }

  pub fn radiology_report(&self, id: u64) -> Query<RadiologyReport> {
    self.cache().subscribe(self.detail_query(report_resource(id)))
  }

  /// Sign a report; the input is the report id.
  pub fn sign_report(&self) -> Mutation<u64, RadiologyReport> {
    self.bind(
      self
        .mutation("sign_report", |api, id: u64| async move {
          api
            .post_empty(&format!("/{}/sign", report_resource(id)))
            .await
        })
        .invalidates([KeyFilter::resource(REPORTS)]),
    )
  }

  pub fn amend_report(&self) -> Mutation<Amendment, RadiologyReport> {
    self.bind(
      self
        .mutation("amend_report", |api, input: Amendment| async move {
          api
            .post(&format!("/{}/amend", report_resource(input.report_id)), &input)
            .await
        })
        .validate(Amendment::validate)
        .invalidates([KeyFilter::resource(REPORTS)]),
    )
  }
}
