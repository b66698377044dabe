use hmis_sync::hmis::emergency::{EdStatus, EsiLevel};
use hmis_sync::hmis::laboratory::{LabOrderStatus, LabPriority};
use ratatui::prelude::Color;

/// Truncate to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Waiting time as `1h05` or `42m`
pub fn format_waiting(minutes: i64) -> String {
  if minutes >= 60 {
    format!("{}h{:02}", minutes / 60, minutes % 60)
  } else {
    format!("{}m", minutes)
  }
}

/// ESI badge color; `None` is an untriaged arrival
pub fn esi_color(esi: Option<EsiLevel>) -> Color {
  match esi {
    Some(EsiLevel::Resuscitation) => Color::Red,
    Some(EsiLevel::Emergent) => Color::LightRed,
    Some(EsiLevel::Urgent) => Color::Yellow,
    Some(EsiLevel::LessUrgent) => Color::Green,
    Some(EsiLevel::NonUrgent) => Color::Blue,
    None => Color::Magenta,
  }
}

pub fn ed_status_color(status: EdStatus) -> Color {
  match status {
    EdStatus::Waiting => Color::Magenta,
    EdStatus::Triaged => Color::Yellow,
    EdStatus::InTreatment => Color::Cyan,
    EdStatus::AwaitingDisposition => Color::LightBlue,
    EdStatus::Admitted | EdStatus::Discharged | EdStatus::Transferred => Color::Green,
    EdStatus::LeftWithoutBeingSeen => Color::DarkGray,
  }
}

pub fn lab_status_color(status: LabOrderStatus) -> Color {
  match status {
    LabOrderStatus::Pending => Color::Yellow,
    LabOrderStatus::Collected => Color::LightBlue,
    LabOrderStatus::InProgress => Color::Cyan,
    LabOrderStatus::Completed => Color::Green,
    LabOrderStatus::Cancelled => Color::DarkGray,
  }
}

pub fn priority_color(priority: LabPriority) -> Color {
  match priority {
    LabPriority::Stat => Color::Red,
    LabPriority::Urgent => Color::Yellow,
    LabPriority::Routine => Color::White,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Ådne Bjørnstad", 7), "Ådne...");
  }

  #[test]
  fn test_format_waiting() {
    assert_eq!(format_waiting(0), "0m");
    assert_eq!(format_waiting(42), "42m");
    assert_eq!(format_waiting(65), "1h05");
  }

  #[test]
  fn test_most_acute_is_red() {
    assert_eq!(esi_color(Some(EsiLevel::Resuscitation)), Color::Red);
    assert_ne!(esi_color(None), esi_color(Some(EsiLevel::NonUrgent)));
  }

  #[test]
  fn test_stat_is_red() {
    assert_eq!(priority_color(LabPriority::Stat), Color::Red);
    assert_eq!(lab_status_color(LabOrderStatus::Completed), Color::Green);
  }
}
