//! Patient registry.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{HmisClient, Page};
use crate::api::{ClientError, ValidationErrors};
use crate::cache::{CacheKey, KeyFilter};
use crate::mutation::Mutation;
use crate::query::Query;

pub const RESOURCE: &str = "patients";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Patient {
  pub id: u64,
  /// Medical record number
  pub mrn: String,
  pub first_name: String,
  pub last_name: String,
  pub date_of_birth: Option<NaiveDate>,
  #[serde(default)]
  pub sex: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub allergies: Vec<String>,
}

impl Patient {
  pub fn full_name(&self) -> String {
    format!("{}, {}", self.last_name, self.first_name)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientFilter {
  pub search: Option<String>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

impl PatientFilter {
  pub fn page(page: u32, page_size: u32) -> Self {
    Self {
      search: None,
      page: Some(page),
      page_size: Some(page_size),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewPatient {
  pub first_name: String,
  pub last_name: String,
  pub date_of_birth: Option<NaiveDate>,
  pub sex: Option<String>,
  pub phone: Option<String>,
  pub email: Option<String>,
}

impl NewPatient {
  /// Field checks run before anything is sent.
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    errors.require("first_name", &self.first_name, "First name is required");
    errors.require("last_name", &self.last_name, "Last name is required");
    match self.date_of_birth {
      None => errors.add("date_of_birth", "Date of birth is required"),
      Some(dob) if dob > Utc::now().date_naive() => {
        errors.add("date_of_birth", "Date of birth cannot be in the future")
      }
      Some(_) => {}
    }
    if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
      if !email.contains('@') {
        errors.add("email", "Email address is not valid");
      }
    }
    errors.into_result()
  }
}

/// Partial update; unset fields are left unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub allergies: Option<Vec<String>>,
}

pub fn detail_key(id: u64) -> CacheKey {
  CacheKey::new(format!("{}/{}", RESOURCE, id))
}

impl HmisClient {
  pub fn patients(&self, filter: &PatientFilter) -> Result<Query<Page<Patient>>, ClientError> {
    Ok(self.cache().subscribe(self.list_query(RESOURCE, filter)?))
  }

  pub fn patient(&self, id: u64) -> Query<Patient> {
    self
      .cache()
      .subscribe(self.detail_query(format!("{}/{}", RESOURCE, id)))
  }

  pub fn create_patient(&self) -> Mutation<NewPatient, Patient> {
    self.bind(
      self
        .mutation("create_patient", |api, input: NewPatient| async move {
          api.post("/patients", &input).await
        })
        .validate(NewPatient::validate)
        .invalidates([KeyFilter::resource(RESOURCE)]),
    )
  }

  /// Input is `(patient id, changes)`.
  pub fn update_patient(&self) -> Mutation<(u64, PatientChanges), Patient> {
    self.bind(
      self
        .mutation(
          "update_patient",
          |api, (id, changes): (u64, PatientChanges)| async move {
            api.patch(&format!("/patients/{}", id), &changes).await
          },
        )
        .invalidates([KeyFilter::resource(RESOURCE)])
        .invalidates_with(|(id, _), _| vec![KeyFilter::exact(detail_key(*id))]),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn valid() -> NewPatient {
    NewPatient {
      first_name: "Ada".to_string(),
      last_name: "Okafor".to_string(),
      date_of_birth: NaiveDate::from_ymd_opt(1980, 4, 12),
      ..Default::default()
    }
  }

  #[test]
  fn test_valid_patient_passes() {
    assert!(valid().validate().is_ok());
  }

  #[test]
  fn test_missing_fields_are_reported_per_field() {
    let patient = NewPatient {
      first_name: "  ".to_string(),
      date_of_birth: None,
      ..valid()
    };
    let Err(ClientError::Validation(errors)) = patient.validate() else {
      panic!("expected validation errors");
    };
    assert_eq!(errors.field("first_name"), ["First name is required"]);
    assert_eq!(errors.field("date_of_birth"), ["Date of birth is required"]);
    assert!(errors.field("last_name").is_empty());
  }

  #[test]
  fn test_future_birth_date_rejected() {
    let patient = NewPatient {
      date_of_birth: Some(Utc::now().date_naive() + chrono::Days::new(2)),
      ..valid()
    };
    assert!(patient.validate().is_err());
  }

  #[test]
  fn test_bad_email_rejected() {
    let patient = NewPatient {
      email: Some("not-an-email".to_string()),
      ..valid()
    };
    let Err(ClientError::Validation(errors)) = patient.validate() else {
      panic!("expected validation errors");
    };
    assert_eq!(errors.field("email").len(), 1);
  }

  #[test]
  fn test_changes_only_serialize_set_fields() {
    let changes = PatientChanges {
      phone: Some("555-0100".to_string()),
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&changes).unwrap(),
      serde_json::json!({"phone": "555-0100"})
    );
  }
}
