use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use hmis_sync::hmis::laboratory::{Acknowledgement, CriticalValue};
use hmis_sync::{ClientError, HmisClient, Mutation, MutationState, Query};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Unacknowledged critical lab results, acknowledged with `a`.
pub struct CriticalValuesView {
  query: Query<Vec<CriticalValue>>,
  acknowledge: Mutation<Acknowledgement, CriticalValue>,
  list_state: ListState,
}

impl CriticalValuesView {
  pub fn new(client: HmisClient) -> Self {
    Self {
      query: client.critical_values(),
      acknowledge: client.acknowledge_critical_value(),
      list_state: ListState::default(),
    }
  }

  fn values(&self) -> Vec<CriticalValue> {
    self
      .query
      .data()
      .map(|values| values.iter().filter(|v| !v.acknowledged).cloned().collect())
      .unwrap_or_default()
  }

  /// Fire the acknowledgement in the background; its state shows in the title
  fn acknowledge_selected(&mut self) {
    let values = self.values();
    let Some(value) = self.list_state.selected().and_then(|i| values.get(i)) else {
      return;
    };
    let mutation = self.acknowledge.clone();
    let input = Acknowledgement {
      critical_value_id: value.id,
      note: None,
    };
    tokio::spawn(async move {
      // Outcome is read back from the mutation state
      let _ = mutation.mutate(input).await;
    });
  }

  fn title(&self, count: usize) -> String {
    let status = match self.acknowledge.state() {
      MutationState::Pending => " (acknowledging...)".to_string(),
      MutationState::Error(e) => format!(" (error: {})", e.user_message()),
      MutationState::Success(v) => format!(" (acknowledged {})", v.test_name),
      MutationState::Idle => String::new(),
    };
    match self.query.error() {
      Some(e) => format!(" Critical values ({}){} (error: {}) ", count, status, e.user_message()),
      None => format!(" Critical values ({}){} ", count, status),
    }
  }
}

impl View for CriticalValuesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('a') | KeyCode::Enter => self.acknowledge_selected(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let values = self.values();
    ensure_valid_selection(&mut self.list_state, values.len());

    let block = Block::default()
      .title(self.title(values.len()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red));

    if values.is_empty() {
      let content = if self.query.is_loading() {
        "Loading..."
      } else {
        "No unacknowledged critical values."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = values
      .iter()
      .map(|v| {
        let reading = match &v.unit {
          Some(unit) => format!("{} {}", v.value, unit),
          None => v.value.clone(),
        };
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<16}", truncate(&v.test_name, 16)), Style::default().fg(Color::Red).bold()),
          Span::styled(format!("{:<12}", reading), Style::default().fg(Color::White).bold()),
          Span::styled(
            format!("{:<22}", truncate(v.patient_name.as_deref().unwrap_or("unknown"), 22)),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(
            format!("order #{} at {}", v.order_id, v.reported_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Critical values".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn error(&self) -> Option<ClientError> {
    self.query.error().or_else(|| self.acknowledge.error())
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("a", "acknowledge").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(26),
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
