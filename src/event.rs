use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use hmis_sync::Session;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and query polling
  Tick,
  /// The session was cleared, by sign-out or an expired token
  SessionEnded,
}

/// Event handler that produces events from terminal input, a tick timer and
/// session changes
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if key.kind == KeyEventKind::Press && input_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if input_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Emit [`Event::SessionEnded`] once the session goes away.
  pub fn watch_session(&self, mut session: watch::Receiver<Option<Session>>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      loop {
        if session.borrow_and_update().is_none() {
          let _ = tx.send(Event::SessionEnded);
          break;
        }
        if session.changed().await.is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
