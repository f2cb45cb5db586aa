use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Error,
}

/// A user-facing message produced by the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: Level,
  pub message: String,
}

/// Sends notifications to whatever surface displays them
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx: Some(tx) }, rx)
  }

  /// Drops every notification
  pub fn silent() -> Self {
    Self { tx: None }
  }

  pub fn info(&self, message: impl Into<String>) {
    self.send(Level::Info, message.into());
  }

  pub fn error(&self, message: impl Into<String>) {
    self.send(Level::Error, message.into());
  }

  fn send(&self, level: Level, message: String) {
    if let Some(tx) = &self.tx {
      // Receiver gone means nobody is displaying; nothing else to do
      if tx.send(Notification { level, message }).is_err() {
        warn!("notification receiver dropped");
      }
    }
  }
}
