use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::sync::Notification;

/// Shell events
#[derive(Debug)]
pub enum Event {
  /// One line typed by the user
  Input(String),
  /// Synchronizer notice (failed mutation, rejected action)
  Notice(Notification),
  /// Output of a background task
  Output(String),
  /// Stdin closed
  Eof,
}

/// Merges stdin lines, notifications and task output into one stream
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(mut notices: mpsc::UnboundedReceiver<Notification>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let input_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        let event = match lines.next_line().await {
          Ok(Some(line)) => Event::Input(line),
          Ok(None) | Err(_) => Event::Eof,
        };
        let eof = matches!(event, Event::Eof);
        if input_tx.send(event).is_err() || eof {
          break;
        }
      }
    });

    let notice_tx = tx.clone();
    tokio::spawn(async move {
      while let Some(notice) = notices.recv().await {
        if notice_tx.send(Event::Notice(notice)).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
