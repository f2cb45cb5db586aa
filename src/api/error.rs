//! Error types for remote API calls.

use thiserror::Error;

/// Errors surfaced by the social API client.
///
/// Precondition failures are raised locally before any request is made;
/// everything else comes from the transport or the server.
#[derive(Error, Debug)]
pub enum ApiError {
  /// No bearer token for an authenticated action.
  #[error("Please login to {action}")]
  MissingCredential { action: &'static str },

  /// A required input was empty after trimming.
  #[error("{field} cannot be empty")]
  EmptyInput { field: &'static str },

  /// Non-success status or `success: false` envelope.
  #[error("{message}")]
  Server { status: u16, message: String },

  /// Request never produced a response.
  #[error("Network error: {0}")]
  Transport(#[from] reqwest::Error),

  /// Response did not match the expected shape.
  #[error("Unexpected response: {0}")]
  Decode(String),

  /// Invalid base URL or endpoint.
  #[error("Invalid URL: {0}")]
  Url(String),

  /// Local state cannot decide which action to take.
  #[error("{0}")]
  Conflict(String),
}

impl ApiError {
  /// Rejected locally, no network call was attempted.
  pub fn is_precondition(&self) -> bool {
    matches!(
      self,
      ApiError::MissingCredential { .. } | ApiError::EmptyInput { .. }
    )
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Server { status, .. } => Some(*status),
      ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
      _ => None,
    }
  }
}
