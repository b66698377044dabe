//! Clinical decision support gate in front of prescribing.
//!
//! The gate runs the server-side interaction/allergy check and holds the
//! primary action back until the check is clear or every blocking alert has
//! been overridden with a recorded reason. A check that could not run is
//! never read as "no interactions".
//!
//! ```text
//! Idle -> Checking -> Clear --------------------------> Submitted
//!                  -> AlertsFound -> Overridden ------> Submitted
//!                  -> CheckFailed -> Overridden ------> Submitted
//!                  (AlertsFound | CheckFailed) -> Cancelled
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::HmisClient;
use crate::api::{ClientError, ValidationErrors};
use crate::mutation::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CdsSeverity {
  Critical,
  Major,
  Moderate,
  Minor,
}

impl CdsSeverity {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Critical => "Critical",
      Self::Major => "Major",
      Self::Moderate => "Moderate",
      Self::Minor => "Minor",
    }
  }

  /// Critical and major alerts block until overridden; the rest are advisory.
  pub fn is_blocking(&self) -> bool {
    matches!(self, Self::Critical | Self::Major)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  DrugInteraction,
  DrugAllergy,
  DuplicateTherapy,
  Dosage,
  Contraindication,
}

impl AlertKind {
  pub fn label(&self) -> &'static str {
    match self {
      Self::DrugInteraction => "Drug interaction",
      Self::DrugAllergy => "Allergy",
      Self::DuplicateTherapy => "Duplicate therapy",
      Self::Dosage => "Dosage",
      Self::Contraindication => "Contraindication",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CdsAlert {
  #[serde(default)]
  pub id: Option<String>,
  pub kind: AlertKind,
  pub severity: CdsSeverity,
  pub message: String,
  /// The drug or allergen the new medication conflicts with
  #[serde(default)]
  pub interacting_with: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CdsCheckRequest {
  pub patient_id: u64,
  pub medication_code: String,
  pub medication_name: String,
  pub dose: Option<String>,
}

impl CdsCheckRequest {
  /// Whether `order` is what this check was run for.
  pub fn covers(&self, order: &impl GatedOrder) -> bool {
    self.patient_id == order.patient_id()
      && self.medication_code == order.medication_code()
      && self.dose.as_deref().map_or(true, |dose| Some(dose) == order.dose())
  }
}

/// An order that has to pass the safety check before it is sent.
pub trait GatedOrder {
  fn patient_id(&self) -> u64;
  fn medication_code(&self) -> &str;
  fn dose(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CdsCheckResponse {
  #[serde(default)]
  pub alerts: Vec<CdsAlert>,
}

/// What an audit record overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
  DrugInteraction,
  DrugAllergy,
  DuplicateTherapy,
  Dosage,
  Contraindication,
  /// The check itself failed and the prescriber proceeded anyway
  CheckUnavailable,
}

impl From<AlertKind> for OverrideKind {
  fn from(kind: AlertKind) -> Self {
    match kind {
      AlertKind::DrugInteraction => Self::DrugInteraction,
      AlertKind::DrugAllergy => Self::DrugAllergy,
      AlertKind::DuplicateTherapy => Self::DuplicateTherapy,
      AlertKind::Dosage => Self::Dosage,
      AlertKind::Contraindication => Self::Contraindication,
    }
  }
}

/// Audit record body for POST `/cds/overrides`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideRecord {
  pub patient_id: u64,
  pub medication_code: String,
  pub kind: OverrideKind,
  pub alert_id: Option<String>,
  pub severity: Option<CdsSeverity>,
  pub message: String,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
  Idle,
  Checking,
  /// Nothing blocking; `advisories` holds any lower-severity alerts
  Clear { advisories: Vec<CdsAlert> },
  AlertsFound(Vec<CdsAlert>),
  CheckFailed(ClientError),
  Overridden,
  Cancelled,
  Submitted,
}

impl GateState {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Idle => "Not checked",
      Self::Checking => "Checking",
      Self::Clear { .. } => "Clear",
      Self::AlertsFound(_) => "Alerts found",
      Self::CheckFailed(_) => "Check unavailable",
      Self::Overridden => "Overridden",
      Self::Cancelled => "Cancelled",
      Self::Submitted => "Submitted",
    }
  }
}

/// One prescribing attempt's pass through the safety check.
pub struct SafetyGate {
  client: HmisClient,
  request: Option<CdsCheckRequest>,
  state: GateState,
  /// Indices of blocking alerts whose override is already on record
  audited: Vec<usize>,
}

impl SafetyGate {
  pub fn new(client: HmisClient) -> Self {
    Self {
      client,
      request: None,
      state: GateState::Idle,
      audited: Vec::new(),
    }
  }

  pub fn state(&self) -> &GateState {
    &self.state
  }

  pub fn can_submit(&self) -> bool {
    matches!(self.state, GateState::Clear { .. } | GateState::Overridden)
  }

  /// Alerts that need an override before submission.
  pub fn blocking_alerts(&self) -> Vec<&CdsAlert> {
    match &self.state {
      GateState::AlertsFound(alerts) => alerts.iter().filter(|a| a.severity.is_blocking()).collect(),
      _ => Vec::new(),
    }
  }

  /// Run the check for `request`, replacing any earlier outcome.
  pub async fn check(&mut self, request: CdsCheckRequest) -> &GateState {
    self.state = GateState::Checking;
    self.audited.clear();

    self.state = match self.client.cds_check(&request).await {
      Ok(response) => {
        let blocking = response
          .alerts
          .iter()
          .filter(|a| a.severity.is_blocking())
          .count();
        debug!(
          alerts = response.alerts.len(),
          blocking, "safety check completed"
        );
        if blocking == 0 {
          GateState::Clear {
            advisories: response.alerts,
          }
        } else {
          GateState::AlertsFound(response.alerts)
        }
      }
      Err(e) => {
        warn!(error = %e, "safety check unavailable, submission blocked");
        GateState::CheckFailed(e)
      }
    };
    self.request = Some(request);
    &self.state
  }

  /// Proceed past blocking alerts or a failed check, recording why.
  ///
  /// Writes one audit record per critical/major alert, or a single
  /// `check_unavailable` record when the check failed. If any write fails the
  /// gate stays blocked; calling again only writes the records still missing.
  pub async fn override_with_reason(&mut self, reason: &str) -> Result<(), ClientError> {
    let mut errors = ValidationErrors::new();
    errors.require("reason", reason, "An override reason is required");
    errors.into_result()?;

    let Some(request) = self.request.clone() else {
      return Err(ClientError::SafetyCheckPending);
    };
    let reason = reason.trim().to_string();

    let pending: Vec<(usize, OverrideRecord)> = match &self.state {
      GateState::AlertsFound(alerts) => alerts
        .iter()
        .enumerate()
        .filter(|(i, alert)| alert.severity.is_blocking() && !self.audited.contains(i))
        .map(|(i, alert)| {
          let record = OverrideRecord {
            patient_id: request.patient_id,
            medication_code: request.medication_code.clone(),
            kind: alert.kind.into(),
            alert_id: alert.id.clone(),
            severity: Some(alert.severity),
            message: alert.message.clone(),
            reason: reason.clone(),
          };
          (i, record)
        })
        .collect(),
      GateState::CheckFailed(e) => vec![(
        0,
        OverrideRecord {
          patient_id: request.patient_id,
          medication_code: request.medication_code.clone(),
          kind: OverrideKind::CheckUnavailable,
          alert_id: None,
          severity: None,
          message: e.to_string(),
          reason: reason.clone(),
        },
      )],
      GateState::Clear { .. } | GateState::Overridden => return Ok(()),
      GateState::Idle | GateState::Checking | GateState::Cancelled | GateState::Submitted => {
        return Err(ClientError::SafetyCheckPending)
      }
    };

    for (index, record) in pending {
      if let Err(e) = self.client.record_override(&record).await {
        warn!(error = %e, kind = ?record.kind, "override audit write failed, still blocked");
        return Err(e);
      }
      self.audited.push(index);
    }

    warn!(
      patient_id = request.patient_id,
      records = self.audited.len(),
      "safety check overridden"
    );
    self.state = GateState::Overridden;
    Ok(())
  }

  pub fn cancel(&mut self) {
    if self.state != GateState::Submitted {
      info!("prescribing cancelled at safety check");
      self.state = GateState::Cancelled;
    }
  }

  /// Run the primary action, only once the gate is clear or overridden and
  /// only for the patient, medication and dose that were checked.
  pub async fn submit<I, O>(&mut self, mutation: &Mutation<I, O>, input: I) -> Result<Arc<O>, ClientError>
  where
    I: GatedOrder + Clone + Send + 'static,
    O: Send + Sync + 'static,
  {
    if !self.can_submit() {
      return Err(ClientError::SafetyCheckPending);
    }
    if !self.request.as_ref().is_some_and(|checked| checked.covers(&input)) {
      warn!(
        patient_id = input.patient_id(),
        medication = input.medication_code(),
        "order differs from the checked one, check again"
      );
      return Err(ClientError::SafetyCheckPending);
    }
    let output = mutation.mutate(input).await?;
    self.state = GateState::Submitted;
    Ok(output)
  }
}

impl HmisClient {
  pub fn safety_gate(&self) -> SafetyGate {
    SafetyGate::new(self.clone())
  }

  pub async fn cds_check(&self, request: &CdsCheckRequest) -> Result<CdsCheckResponse, ClientError> {
    if !self.auth().is_signed_in() {
      return Err(ClientError::NotSignedIn);
    }
    self.api().post("/cds/check", request).await
  }

  pub async fn record_override(&self, record: &OverrideRecord) -> Result<(), ClientError> {
    let _: Value = self.api().post("/cds/overrides", record).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_critical_and_major_block() {
    assert!(CdsSeverity::Critical.is_blocking());
    assert!(CdsSeverity::Major.is_blocking());
    assert!(!CdsSeverity::Moderate.is_blocking());
    assert!(!CdsSeverity::Minor.is_blocking());
  }

  #[test]
  fn test_unknown_severity_fails_to_decode() {
    let alert = serde_json::json!({
      "kind": "drug_interaction",
      "severity": "catastrophic",
      "message": "x"
    });
    assert!(serde_json::from_value::<CdsAlert>(alert).is_err());
  }

  struct Order(u64, &'static str, &'static str);

  impl GatedOrder for Order {
    fn patient_id(&self) -> u64 {
      self.0
    }
    fn medication_code(&self) -> &str {
      self.1
    }
    fn dose(&self) -> Option<&str> {
      Some(self.2)
    }
  }

  #[test]
  fn test_check_covers_only_the_same_order() {
    let checked = CdsCheckRequest {
      patient_id: 7,
      medication_code: "RX-PARA".to_string(),
      medication_name: "Paracetamol".to_string(),
      dose: Some("1 g".to_string()),
    };
    assert!(checked.covers(&Order(7, "RX-PARA", "1 g")));
    assert!(!checked.covers(&Order(99, "RX-PARA", "1 g")));
    assert!(!checked.covers(&Order(7, "RX-ASPIRIN", "1 g")));
    assert!(!checked.covers(&Order(7, "RX-PARA", "2 g")));

    let any_dose = CdsCheckRequest { dose: None, ..checked };
    assert!(any_dose.covers(&Order(7, "RX-PARA", "2 g")));
  }

  #[test]
  fn test_override_kind_wire_names() {
    assert_eq!(
      serde_json::to_value(OverrideKind::CheckUnavailable).unwrap(),
      serde_json::json!("check_unavailable")
    );
    assert_eq!(
      serde_json::to_value(OverrideKind::from(AlertKind::DrugAllergy)).unwrap(),
      serde_json::json!("drug_allergy")
    );
  }
}
