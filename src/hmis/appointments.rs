//! Scheduling: appointments and the provider directory.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{HmisClient, Page};
use crate::api::{ClientError, ValidationErrors};
use crate::cache::{CacheKey, KeyFilter};
use crate::mutation::Mutation;
use crate::query::Query;

pub const RESOURCE: &str = "appointments";
pub const PROVIDERS: &str = "providers";

/// Cancelling closer than this many hours to the start is refused by the server.
pub const LATE_CANCEL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
  Scheduled,
  CheckedIn,
  InProgress,
  Completed,
  Cancelled,
  NoShow,
}

impl AppointmentStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Scheduled => "Scheduled",
      Self::CheckedIn => "Checked in",
      Self::InProgress => "In progress",
      Self::Completed => "Completed",
      Self::Cancelled => "Cancelled",
      Self::NoShow => "No show",
    }
  }

  pub fn is_cancellable(&self) -> bool {
    matches!(self, Self::Scheduled | Self::CheckedIn)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Appointment {
  pub id: u64,
  pub patient_id: u64,
  #[serde(default)]
  pub patient_name: Option<String>,
  pub provider_id: u64,
  #[serde(default)]
  pub provider_name: Option<String>,
  pub scheduled_start: DateTime<Utc>,
  pub scheduled_end: DateTime<Utc>,
  pub status: AppointmentStatus,
  #[serde(default)]
  pub reason: Option<String>,
}

impl Appointment {
  /// Whether a cancellation at `now` falls inside the late-cancel window.
  /// An appointment that has already started is past it, so counts as late.
  ///
  /// Only a hint for the form; the server decides and answers 422 if late.
  pub fn within_late_cancel_window(&self, now: DateTime<Utc>) -> bool {
    self.scheduled_start - now < Duration::hours(LATE_CANCEL_HOURS)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Provider {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub specialty: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentFilter {
  pub provider_id: Option<u64>,
  pub patient_id: Option<u64>,
  pub status: Option<AppointmentStatus>,
  pub date_from: Option<NaiveDate>,
  pub date_to: Option<NaiveDate>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointment {
  pub patient_id: u64,
  pub provider_id: u64,
  pub scheduled_start: DateTime<Utc>,
  pub duration_minutes: u32,
  pub reason: Option<String>,
}

impl NewAppointment {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    if self.duration_minutes == 0 {
      errors.add("duration_minutes", "Duration must be at least one minute");
    }
    if self.scheduled_start < Utc::now() {
      errors.add("scheduled_start", "Appointment cannot start in the past");
    }
    errors.into_result()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelAppointment {
  #[serde(skip)]
  pub id: u64,
  pub reason: Option<String>,
}

/// Group appointments by calendar day in `tz`, each day sorted by start time.
pub fn bucket_by_day<Tz: TimeZone>(
  appointments: &[Appointment],
  tz: &Tz,
) -> BTreeMap<NaiveDate, Vec<Appointment>> {
  let mut days: BTreeMap<NaiveDate, Vec<Appointment>> = BTreeMap::new();
  for appointment in appointments {
    let day = appointment.scheduled_start.with_timezone(tz).date_naive();
    days.entry(day).or_default().push(appointment.clone());
  }
  for bucket in days.values_mut() {
    bucket.sort_by_key(|a| a.scheduled_start);
  }
  days
}

impl HmisClient {
  pub fn appointments(
    &self,
    filter: &AppointmentFilter,
  ) -> Result<Query<Page<Appointment>>, ClientError> {
    Ok(self.cache().subscribe(self.list_query(RESOURCE, filter)?))
  }

  pub fn appointment(&self, id: u64) -> Query<Appointment> {
    self
      .cache()
      .subscribe(self.detail_query(format!("{}/{}", RESOURCE, id)))
  }

  /// Provider directory. Reference data, fresh for a long time.
  pub fn providers(&self) -> Query<Vec<Provider>> {
    self.cache().subscribe(self.reference_query(PROVIDERS))
  }

  pub fn create_appointment(&self) -> Mutation<NewAppointment, Appointment> {
    self.bind(
      self
        .mutation("create_appointment", |api, input: NewAppointment| async move {
          api.post("/appointments", &input).await
        })
        .validate(NewAppointment::validate)
        .invalidates([KeyFilter::resource(RESOURCE)]),
    )
  }

  pub fn cancel_appointment(&self) -> Mutation<CancelAppointment, Appointment> {
    self.bind(
      self
        .mutation("cancel_appointment", |api, input: CancelAppointment| async move {
          api
            .post(&format!("/appointments/{}/cancel", input.id), &input)
            .await
        })
        .invalidates([KeyFilter::resource(RESOURCE)])
        .invalidates_with(|input, _| {
          vec![KeyFilter::exact(CacheKey::new(format!(
            "{}/{}",
            RESOURCE, input.id
          )))]
        }),
    )
  }
}
