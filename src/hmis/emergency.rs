//! Emergency department track board, triage and disposition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::HmisClient;
use crate::api::{ClientError, QueryParams, ValidationErrors};
use crate::cache::{CacheKey, KeyFilter};
use crate::mutation::Mutation;
use crate::query::Query;

pub const RESOURCE: &str = "emergency";
pub const TRACK_BOARD: &str = "emergency/track-board";

/// Emergency Severity Index, 1 (resuscitation) to 5 (non-urgent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EsiLevel {
  Resuscitation = 1,
  Emergent = 2,
  Urgent = 3,
  LessUrgent = 4,
  NonUrgent = 5,
}

impl EsiLevel {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Resuscitation => "ESI 1 Resuscitation",
      Self::Emergent => "ESI 2 Emergent",
      Self::Urgent => "ESI 3 Urgent",
      Self::LessUrgent => "ESI 4 Less urgent",
      Self::NonUrgent => "ESI 5 Non-urgent",
    }
  }

  pub fn level(&self) -> u8 {
    *self as u8
  }
}

impl TryFrom<u8> for EsiLevel {
  type Error = String;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      1 => Ok(Self::Resuscitation),
      2 => Ok(Self::Emergent),
      3 => Ok(Self::Urgent),
      4 => Ok(Self::LessUrgent),
      5 => Ok(Self::NonUrgent),
      other => Err(format!("ESI level must be 1-5, got {}", other)),
    }
  }
}

impl From<EsiLevel> for u8 {
  fn from(level: EsiLevel) -> Self {
    level as u8
  }
}

impl fmt::Display for EsiLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.level())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdStatus {
  Waiting,
  Triaged,
  InTreatment,
  AwaitingDisposition,
  Admitted,
  Discharged,
  Transferred,
  LeftWithoutBeingSeen,
}

impl EdStatus {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Waiting => "Waiting",
      Self::Triaged => "Triaged",
      Self::InTreatment => "In treatment",
      Self::AwaitingDisposition => "Awaiting dispo",
      Self::Admitted => "Admitted",
      Self::Discharged => "Discharged",
      Self::Transferred => "Transferred",
      Self::LeftWithoutBeingSeen => "LWBS",
    }
  }

  /// Still physically in the department.
  pub fn is_active(&self) -> bool {
    matches!(
      self,
      Self::Waiting | Self::Triaged | Self::InTreatment | Self::AwaitingDisposition
    )
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EdVisit {
  pub id: u64,
  pub patient_id: u64,
  pub patient_name: String,
  #[serde(default)]
  pub chief_complaint: Option<String>,
  /// Unset until triage
  #[serde(default)]
  pub esi: Option<EsiLevel>,
  pub status: EdStatus,
  #[serde(default)]
  pub zone: Option<String>,
  #[serde(default)]
  pub bed: Option<String>,
  pub arrived_at: DateTime<Utc>,
  #[serde(default)]
  pub provider: Option<String>,
}

impl EdVisit {
  /// Minutes since arrival, never negative.
  pub fn waiting_minutes(&self, now: DateTime<Utc>) -> i64 {
    (now - self.arrived_at).num_minutes().max(0)
  }

  fn matches_text(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.patient_name.to_lowercase().contains(&needle)
      || self
        .chief_complaint
        .as_deref()
        .is_some_and(|c| c.to_lowercase().contains(&needle))
      || self
        .bed
        .as_deref()
        .is_some_and(|b| b.to_lowercase().contains(&needle))
  }
}

/// Server-side filter for the track board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackBoardFilter {
  pub zone: Option<String>,
  pub status: Option<EdStatus>,
}

/// Track board order: most acute first, untriaged after triaged, then by arrival.
pub fn sort_track_board(visits: &mut [EdVisit]) {
  visits.sort_by(|a, b| {
    let acuity = |v: &EdVisit| v.esi.map(|e| e.level()).unwrap_or(u8::MAX);
    acuity(a)
      .cmp(&acuity(b))
      .then_with(|| a.arrived_at.cmp(&b.arrived_at))
  });
}

/// Client-side narrowing of an already-fetched board.
pub fn filter_track_board<'a>(
  visits: &'a [EdVisit],
  zone: Option<&str>,
  status: Option<EdStatus>,
  text: &str,
) -> Vec<&'a EdVisit> {
  let text = text.trim();
  visits
    .iter()
    .filter(|v| zone.map_or(true, |z| v.zone.as_deref() == Some(z)))
    .filter(|v| status.map_or(true, |s| v.status == s))
    .filter(|v| text.is_empty() || v.matches_text(text))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageUpdate {
  #[serde(skip)]
  pub visit_id: u64,
  pub esi: EsiLevel,
  pub chief_complaint: Option<String>,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionKind {
  Admit,
  Discharge,
  Transfer,
  LeftWithoutBeingSeen,
}

impl DispositionKind {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Admit => "Admit",
      Self::Discharge => "Discharge",
      Self::Transfer => "Transfer",
      Self::LeftWithoutBeingSeen => "Left without being seen",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Disposition {
  #[serde(skip)]
  pub visit_id: u64,
  pub disposition: DispositionKind,
  pub destination: Option<String>,
  pub notes: Option<String>,
}

impl Disposition {
  pub fn validate(&self) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    if matches!(self.disposition, DispositionKind::Admit | DispositionKind::Transfer) {
      errors.require(
        "destination",
        self.destination.as_deref().unwrap_or(""),
        "Destination is required",
      );
    }
    errors.into_result()
  }
}

impl HmisClient {
  /// Live ED board, polled while mounted.
  pub fn track_board(&self, filter: &TrackBoardFilter) -> Result<Query<Vec<EdVisit>>, ClientError> {
    let key = CacheKey::with_params(TRACK_BOARD, QueryParams::from_filter(filter)?);
    let descriptor = self
      .get_query(key, self.policy().list)
      .refetch_interval(self.policy().track_board_poll);
    Ok(self.cache().subscribe(descriptor))
  }

  pub fn update_triage(&self) -> Mutation<TriageUpdate, EdVisit> {
    self.bind(
      self
        .mutation("update_triage", |api, input: TriageUpdate| async move {
          api
            .patch(&format!("/emergency/visits/{}/triage", input.visit_id), &input)
            .await
        })
        .invalidates([KeyFilter::resource(RESOURCE)]),
    )
  }

  pub fn set_disposition(&self) -> Mutation<Disposition, EdVisit> {
    self.bind(
      self
        .mutation("set_disposition", |api, input: Disposition| async move {
          api
            .post(
              &format!("/emergency/visits/{}/disposition", input.visit_id),
              &input,
            )
            .await
        })
        .validate(Disposition::validate)
        .invalidates([KeyFilter::resource(RESOURCE)]),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  fn visit(id: u64, esi: Option<u8>, minute: u32, name: &str) -> EdVisit {
    EdVisit {
      id,
      patient_id: id,
      patient_name: name.to_string(),
      chief_complaint: Some("Chest pain".to_string()),
      esi: esi.map(|e| EsiLevel::try_from(e).unwrap()),
      status: EdStatus::Waiting,
      zone: Some("A".to_string()),
      bed: None,
      arrived_at: Utc.with_ymd_and_hms(2026, 5, 1, 10, minute, 0).unwrap(),
      provider: None,
    }
  }

  #[test]
  fn test_sort_by_esi_then_arrival() {
    let mut visits = vec![
      visit(1, Some(3), 0, "A"),
      visit(2, None, 1, "B"),
      visit(3, Some(1), 20, "C"),
      visit(4, Some(3), 5, "D"),
      visit(5, Some(2), 30, "E"),
    ];
    sort_track_board(&mut visits);
    let ids: Vec<u64> = visits.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![3, 5, 1, 4, 2]);
  }

  #[test]
  fn test_esi_wire_format_is_integer() {
    let level: EsiLevel = serde_json::from_str("2").unwrap();
    assert_eq!(level, EsiLevel::Emergent);
    assert_eq!(serde_json::to_string(&level).unwrap(), "2");
    assert!(serde_json::from_str::<EsiLevel>("6").is_err());
  }

  #[test]
  fn test_filter_by_text_zone_and_status() {
    let mut other = visit(2, Some(4), 3, "Maria Lopez");
    other.zone = Some("B".to_string());
    other.chief_complaint = Some("Ankle sprain".to_string());
    let visits = vec![visit(1, Some(2), 0, "John Smith"), other];

    assert_eq!(filter_track_board(&visits, None, None, "ankle").len(), 1);
    assert_eq!(filter_track_board(&visits, Some("A"), None, "").len(), 1);
    assert_eq!(
      filter_track_board(&visits, None, Some(EdStatus::Admitted), "").len(),
      0
    );
    assert_eq!(filter_track_board(&visits, None, None, "  ").len(), 2);
  }

  #[test]
  fn test_waiting_minutes() {
    let v = visit(1, None, 0, "A");
    assert_eq!(v.waiting_minutes(v.arrived_at + Duration::minutes(42)), 42);
    assert_eq!(v.waiting_minutes(v.arrived_at - Duration::minutes(5)), 0);
  }

  #[test]
  fn test_admit_requires_destination() {
    let dispo = Disposition {
      visit_id: 1,
      disposition: DispositionKind::Admit,
      destination: None,
      notes: None,
    };
    assert!(dispo.validate().is_err());
    let discharge = Disposition {
      disposition: DispositionKind::Discharge,
      ..dispo
    };
    assert!(discharge.validate().is_ok());
  }
}
