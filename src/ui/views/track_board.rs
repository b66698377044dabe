use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{ed_status_color, esi_color, format_waiting, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use hmis_sync::hmis::emergency::{filter_track_board, sort_track_board, EdVisit, TrackBoardFilter};
use hmis_sync::{ClientError, HmisClient, Query, QueryState};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Live emergency department board, most acute first.
pub struct TrackBoardView {
  query: Result<Query<Vec<EdVisit>>, ClientError>,
  /// Sorted copy of the last fetched board
  visits: Vec<EdVisit>,
  list_state: ListState,
  search: SearchInput,
  zone: Option<String>,
  show_departed: bool,
}

impl TrackBoardView {
  pub fn new(client: &HmisClient) -> Self {
    let mut view = Self {
      query: client.track_board(&TrackBoardFilter::default()),
      visits: Vec::new(),
      list_state: ListState::default(),
      search: SearchInput::new("name, complaint or bed"),
      zone: None,
      show_departed: false,
    };
    view.refresh_snapshot();
    view
  }

  fn refresh_snapshot(&mut self) {
    let Ok(query) = &self.query else {
      return;
    };
    if let Some(data) = query.data() {
      let mut visits = data.as_ref().clone();
      sort_track_board(&mut visits);
      self.visits = visits;
    }
  }

  /// Rows after the zone, text and departed filters
  fn rows(&self) -> Vec<&EdVisit> {
    filter_track_board(&self.visits, self.zone.as_deref(), None, self.search.query())
      .into_iter()
      .filter(|v| self.show_departed || v.status.is_active())
      .collect()
  }

  fn zones(&self) -> Vec<String> {
    let mut zones: Vec<String> = self.visits.iter().filter_map(|v| v.zone.clone()).collect();
    zones.sort();
    zones.dedup();
    zones
  }

  /// All zones, then each zone in turn
  fn cycle_zone(&mut self) {
    let zones = self.zones();
    self.zone = match &self.zone {
      None => zones.first().cloned(),
      Some(current) => zones
        .iter()
        .position(|z| z == current)
        .and_then(|i| zones.get(i + 1))
        .cloned(),
    };
  }

  fn title(&self) -> String {
    let scope = self.zone.as_deref().unwrap_or("all zones");
    let count = self.rows().len();
    match &self.query {
      Err(e) => format!(" Track board (error: {}) ", e.user_message()),
      Ok(query) => match query.state() {
        QueryState::Idle | QueryState::Loading => format!(" Track board [{}] (loading...) ", scope),
        QueryState::Error(e) => {
          format!(" Track board [{}] ({}) (error: {}) ", scope, count, e.user_message())
        }
        QueryState::Success(_) if query.is_fetching() => {
          format!(" Track board [{}] ({}) (refreshing) ", scope, count)
        }
        QueryState::Success(_) => format!(" Track board [{}] ({}) ", scope, count),
      },
    }
  }

  fn render_board(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.rows().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match &self.query {
        Err(_) => "Could not build the track board request.",
        Ok(query) if query.is_loading() => "Loading...",
        Ok(query) if query.is_error() => "Failed to load the track board. Press 'r' to retry.",
        Ok(_) if self.visits.is_empty() => "No patients in the department.",
        Ok(_) => "No patients match the current filter.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = self
      .rows()
      .into_iter()
      .map(|visit| {
        let esi = visit
          .esi
          .map(|e| format!("ESI {}", e))
          .unwrap_or_else(|| "ESI -".to_string());
        let location = match (&visit.zone, &visit.bed) {
          (Some(zone), Some(bed)) => format!("{} {}", zone, bed),
          (Some(zone), None) => zone.clone(),
          (None, Some(bed)) => bed.clone(),
          (None, None) => "-".to_string(),
        };

        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<6}", esi), Style::default().fg(esi_color(visit.esi)).bold()),
          Span::raw(" "),
          Span::styled(
            format!("{:>5}", format_waiting(visit.waiting_minutes(now))),
            Style::default().fg(Color::White),
          ),
          Span::raw("  "),
          Span::styled(
            format!("{:<22}", truncate(&visit.patient_name, 22)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!(
            "{:<28}",
            truncate(visit.chief_complaint.as_deref().unwrap_or(""), 28)
          )),
          Span::raw(" "),
          Span::raw(format!("{:<10}", truncate(&location, 10))),
          Span::raw(" "),
          Span::styled(visit.status.label(), Style::default().fg(ed_status_color(visit.status))),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TrackBoardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(_)) => {
        self.list_state.select(Some(0));
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => {
        if let Ok(query) = &self.query {
          query.refetch();
        }
      }
      KeyCode::Char('z') => {
        self.cycle_zone();
        self.list_state.select(Some(0));
      }
      KeyCode::Char('a') => self.show_departed = !self.show_departed,
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_board(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.zone {
      Some(zone) => format!("Track board [{}]", zone),
      None => "Track board".to_string(),
    }
  }

  fn tick(&mut self) {
    if let Ok(query) = &mut self.query {
      if query.poll() {
        self.refresh_snapshot();
      }
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn error(&self) -> Option<ClientError> {
    match &self.query {
      Ok(query) => query.error(),
      Err(e) => Some(e.clone()),
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("z", "zone").with_priority(22),
      ShortcutInfo::new("a", "departed").with_priority(24),
      ShortcutInfo::new("r", "refresh").with_priority(26),
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
