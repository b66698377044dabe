use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{lab_status_color, priority_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::CriticalValuesView;
use crossterm::event::{KeyCode, KeyEvent};
use hmis_sync::hmis::laboratory::{sort_worklist, CriticalValue, LabOrder, LabOrderFilter};
use hmis_sync::hmis::Page;
use hmis_sync::{ClientError, HmisClient, Query, QueryState};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Pending laboratory orders, STAT first.
pub struct LabWorklistView {
  client: HmisClient,
  orders: Result<Query<Page<LabOrder>>, ClientError>,
  critical: Query<Vec<CriticalValue>>,
  worklist: Vec<LabOrder>,
  list_state: ListState,
  search: SearchInput,
}

impl LabWorklistView {
  pub fn new(client: HmisClient) -> Self {
    let orders = client.lab_orders(&LabOrderFilter::pending());
    let critical = client.critical_values();
    let mut view = Self {
      client,
      orders,
      critical,
      worklist: Vec::new(),
      list_state: ListState::default(),
      search: SearchInput::new("patient or test"),
    };
    view.refresh_snapshot();
    view
  }

  fn refresh_snapshot(&mut self) {
    if let Some(page) = self.orders.as_ref().ok().and_then(|q| q.data()) {
      let mut orders = page.items.clone();
      sort_worklist(&mut orders);
      self.worklist = orders;
    }
  }

  fn rows(&self) -> Vec<&LabOrder> {
    let needle = self.search.query().trim().to_lowercase();
    self
      .worklist
      .iter()
      .filter(|order| {
        needle.is_empty()
          || order
            .patient_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&needle))
          || order.tests.iter().any(|t| t.to_lowercase().contains(&needle))
      })
      .collect()
  }

  fn unacknowledged_critical(&self) -> Option<usize> {
    self
      .critical
      .data()
      .map(|values| values.iter().filter(|v| !v.acknowledged).count())
  }

  fn title(&self) -> String {
    let critical = match self.unacknowledged_critical() {
      Some(0) => String::new(),
      Some(n) => format!(" [{} critical]", n),
      None => String::new(),
    };
    match &self.orders {
      Err(e) => format!(" Lab worklist (error: {}) ", e.user_message()),
      Ok(query) => match query.state() {
        QueryState::Idle | QueryState::Loading => " Lab worklist (loading...) ".to_string(),
        QueryState::Error(e) => format!(
          " Lab worklist ({}){} (error: {}) ",
          self.worklist.len(),
          critical,
          e.user_message()
        ),
        QueryState::Success(page) => {
          format!(" Lab worklist ({} of {}){} ", self.rows().len(), page.total, critical)
        }
      },
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.rows().len();
    ensure_valid_selection(&mut self.list_state, len);

    let border = if self.unacknowledged_critical().unwrap_or(0) > 0 {
      Color::Red
    } else {
      Color::Blue
    };
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border));

    if len == 0 {
      let content = match &self.orders {
        Err(_) => "Could not build the worklist request.",
        Ok(query) if query.is_loading() => "Loading...",
        Ok(query) if query.is_error() => "Failed to load lab orders. Press 'r' to retry.",
        Ok(_) => "No pending lab orders.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .rows()
      .into_iter()
      .map(|order| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<8}", order.priority.label()),
            Style::default().fg(priority_color(order.priority)).bold(),
          ),
          Span::styled(format!("#{:<7}", order.id), Style::default().fg(Color::DarkGray)),
          Span::styled(
            format!(
              "{:<22}",
              truncate(order.patient_name.as_deref().unwrap_or("unknown"), 22)
            ),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!("{:<34}", truncate(&order.tests.join(", "), 34))),
          Span::raw(" "),
          Span::raw(format!("{} ", order.ordered_at.format("%H:%M"))),
          Span::styled(
            order.status.label(),
            Style::default().fg(lab_status_color(order.status)),
          ),
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

impl View for LabWorklistView {
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
        if let Ok(orders) = &self.orders {
          orders.refetch();
        }
        self.critical.refetch();
      }
      KeyCode::Char('c') => {
        return ViewAction::Push(Box::new(CriticalValuesView::new(self.client.clone())));
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Lab worklist".to_string()
  }

  fn tick(&mut self) {
    // Counter only, no snapshot to rebuild
    self.critical.poll();
    if let Ok(orders) = &mut self.orders {
      if orders.poll() {
        self.refresh_snapshot();
      }
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn error(&self) -> Option<ClientError> {
    match &self.orders {
      Ok(query) => query.error().or_else(|| self.critical.error()),
      Err(e) => Some(e.clone()),
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("c", "critical values").with_priority(22),
      ShortcutInfo::new("r", "refresh").with_priority(26),
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
