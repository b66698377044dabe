use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{LabWorklistView, TrackBoardView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use hmis_sync::{HmisClient, Session};
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{info, warn};

/// Root view the TUI opens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartView {
  TrackBoard,
  LabWorklist,
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  command_input: CommandInput,

  /// Footer message, e.g. an unknown command
  status: Option<String>,

  title: String,

  client: HmisClient,

  should_quit: bool,

  session_ended: bool,
}

impl App {
  pub fn new(config: Config, client: HmisClient, start: StartView) -> Self {
    let mut app = Self {
      view_stack: Vec::new(),
      command_input: CommandInput::new(),
      status: None,
      title: config.display_title(),
      client,
      should_quit: false,
      session_ended: false,
    };
    app.set_root(start);
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    events.watch_session(self.client.auth().subscribe());

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Restore the terminal even when drawing failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::SessionEnded => self.end_session(),
    }
  }

  fn tick(&mut self) {
    let Some(view) = self.view_stack.last_mut() else {
      return;
    };
    view.tick();

    if let Some(api) = view.error().as_ref().and_then(|e| e.api().cloned()) {
      if api.is_unauthorized() {
        warn!(status = api.status, "session rejected by server");
        self.client.sign_out();
      }
    }
  }

  fn end_session(&mut self) {
    info!("session ended, leaving the UI");
    self.session_ended = true;
    self.should_quit = true;
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let view_capturing = self
      .current_view()
      .is_some_and(|view| view.is_capturing_input());
    if !view_capturing {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    self.status = None;
    let Some(view) = self.view_stack.last_mut() else {
      return;
    };
    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, cmd: &str) {
    self.status = None;
    match cmd {
      "board" => self.set_root(StartView::TrackBoard),
      "labs" => self.set_root(StartView::LabWorklist),
      "quit" => self.should_quit = true,
      "" => {}
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
  }

  /// Replace the whole stack; dropped views unsubscribe their queries
  fn set_root(&mut self, start: StartView) {
    let root: Box<dyn View> = match start {
      StartView::TrackBoard => Box::new(TrackBoardView::new(&self.client)),
      StartView::LabWorklist => Box::new(LabWorklistView::new(self.client.clone())),
    };
    self.view_stack.clear();
    self.view_stack.push(root);
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command_input
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn session(&self) -> Option<Session> {
    self.client.auth().get()
  }

  /// The session was cleared while the UI was running
  pub fn session_ended(&self) -> bool {
    self.session_ended
  }
}
