//! Prescriptions. Submission normally goes through the CDS gate in [`super::cds`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cds::{CdsCheckRequest, GatedOrder};
use super::HmisClient;
use crate::api::{ClientError, ValidationErrors};
use crate::cache::{CacheKey, KeyFilter};
use crate::mutation::Mutation;
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
  Active,
  Completed,
  Discontinued,
}

impl PrescriptionStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Active => "Active",
      Self::Completed => "Completed",
      Self::Discontinued => "Discontinued",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Prescription {
  pub id: u64,
  pub patient_id: u64,
  pub medication_code: String,
  pub medication_name: String,
  pub dose: String,
  pub frequency: String,
  #[serde(default)]
  pub route: Option<String>,
  pub status: PrescriptionStatus,
  pub prescribed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPrescription {
  pub patient_id: u64,
  pub medication_code: String,
  pub medication_name: String,
  pub dose: String,
  pub frequency: String,
  pub route: Option<String>,
  pub duration_days: Option<u32>,
  pub notes: Option<String>,
}

impl NewPrescription {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    errors.require("medication_code", &self.medication_code, "Choose a medication");
    errors.require("dose", &self.dose, "Dose is required");
    errors.require("frequency", &self.frequency, "Frequency is required");
    if self.duration_days == Some(0) {
      errors.add("duration_days", "Duration must be at least one day");
    }
    errors.into_result()
  }
}

impl GatedOrder for NewPrescription {
  fn patient_id(&self) -> u64 {
    self.patient_id
  }

  fn medication_code(&self) -> &str {
    &self.medication_code
  }

  fn dose(&self) -> Option<&str> {
    Some(&self.dose)
  }
}

impl From<&NewPrescription> for CdsCheckRequest {
  fn from(rx: &NewPrescription) -> Self {
    Self {
      patient_id: rx.patient_id,
      medication_code: rx.medication_code.clone(),
      medication_name: rx.medication_name.clone(),
      dose: Some(rx.dose.clone()),
    }
  }
}

pub fn patient_prescriptions_resource(patient_id: u64) -> String {
  format!("patients/{}/prescriptions", patient_id)
}

impl HmisClient {
  pub fn prescriptions(&self, patient_id: u64) -> Query<Vec<Prescription>> {
    self
      .cache()
      .subscribe(self.detail_query(patient_prescriptions_resource(patient_id)))
  }

  pub fn create_prescription(&self) -> Mutation<NewPrescription, Prescription> {
    self.bind(
      self
        .mutation("create_prescription", |api, input: NewPrescription| async move {
          api.post("/prescriptions", &input).await
        })
        .validate(NewPrescription::validate)
        .invalidates_with(|input, _| {
          vec![KeyFilter::exact(CacheKey::new(patient_prescriptions_resource(
            input.patient_id,
          )))]
        }),
    )
  }
}
