use std::sync::{Arc, RwLock};

use crate::api::Session;

/// Credentials shared by the read client and the actions.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
  inner: Arc<RwLock<Option<Session>>>,
}

impl Credentials {
  pub fn new(token: Option<String>) -> Self {
    let session = token.map(|token| Session {
      token,
      username: None,
    });
    Self {
      inner: Arc::new(RwLock::new(session)),
    }
  }

  pub fn token(&self) -> Option<String> {
    self.read(|s| s.token.clone())
  }

  pub fn username(&self) -> Option<String> {
    self.read(|s| s.username.clone()).flatten()
  }

  pub fn set(&self, session: Session) {
    *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
  }

  pub fn clear(&self) {
    *self.inner.write().unwrap_or_else(|e| e.into_inner()) = None;
  }

  fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
    self
      .inner
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .as_ref()
      .map(f)
  }
}
