use crate::ui::view::ShortcutInfo;
use hmis_sync::Session;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, site, session and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  session: Option<&Session>,
  shortcuts: &[ShortcutInfo],
) {
  let (tenant, user) = match session {
    Some(s) => (s.tenant_id.as_str(), s.user.as_deref().unwrap_or("")),
    None => ("signed out", ""),
  };

  let mut spans = vec![
    Span::styled(" hmis ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", tenant), Style::default().fg(Color::Yellow).bold()),
  ];
  if !user.is_empty() {
    spans.push(Span::styled(format!("{} ", user), Style::default().fg(Color::DarkGray)));
  }
  spans.push(Span::raw(" "));

  // Shortcuts - keys highlighted, descriptions dimmed
  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}   ", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}
