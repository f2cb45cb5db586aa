//! Cache keys: resource type + resource id + query parameters.

use std::fmt;

/// Identifier of a cached value.
///
/// Two keys are equal only when resource, id and every parameter match.
/// Parameters are kept sorted so insertion order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  resource: String,
  id: Option<String>,
  params: Vec<(String, String)>,
}

impl CacheKey {
  /// Key for a resource without an id (e.g. the feed).
  pub fn new(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      id: None,
      params: Vec::new(),
    }
  }

  pub fn with_id(mut self, id: impl ToString) -> Self {
    self.id = Some(id.to_string());
    self
  }

  /// Add (or replace) a query parameter such as `page`.
  pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    let name = name.into();
    let value = value.to_string();
    match self.params.binary_search_by(|(k, _)| k.as_str().cmp(&name)) {
      Ok(pos) => self.params[pos].1 = value,
      Err(pos) => self.params.insert(pos, (name, value)),
    }
    self
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn id(&self) -> Option<&str> {
    self.id.as_deref()
  }

  pub fn param(&self, name: &str) -> Option<&str> {
    self
      .params
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  /// The prefix that addresses this key and all its parameter variants.
  pub fn prefix(&self) -> KeyPrefix {
    KeyPrefix {
      resource: self.resource.clone(),
      id: self.id.clone(),
    }
  }

  pub fn matches(&self, prefix: &KeyPrefix) -> bool {
    self.resource == prefix.resource
      && match &prefix.id {
        Some(id) => self.id.as_deref() == Some(id.as_str()),
        None => true,
      }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.resource)?;
    if let Some(id) = &self.id {
      write!(f, "/{}", id)?;
    }
    for (i, (k, v)) in self.params.iter().enumerate() {
      let sep = if i == 0 { '?' } else { '&' };
      write!(f, "{}{}={}", sep, k, v)?;
    }
    Ok(())
  }
}

/// Matches every key of a resource, optionally narrowed to one id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix {
  resource: String,
  id: Option<String>,
}

impl KeyPrefix {
  pub fn resource(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      id: None,
    }
  }

  pub fn with_id(mut self, id: impl ToString) -> Self {
    self.id = Some(id.to_string());
    self
  }
}

impl From<&CacheKey> for KeyPrefix {
  fn from(key: &CacheKey) -> Self {
    key.prefix()
  }
}

impl fmt::Display for KeyPrefix {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.id {
      Some(id) => write!(f, "{}/{}/*", self.resource, id),
      None => write!(f, "{}/*", self.resource),
    }
  }
}
