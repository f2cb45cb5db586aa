//! Serde-deserializable types matching the social API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use super::error::ApiError;
use super::types::{Author, Page, Pagination, Post, Session};

// ============================================================================
// Envelope shared by every endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub success: bool,
  pub message: Option<String>,
  #[serde(default)]
  pub data: Value,
}

/// Decode a response body, turning failures into `ApiError::Server`.
///
/// `fallback` is the message used when the server gave none.
pub fn decode_envelope<T: DeserializeOwned>(
  status: StatusCode,
  body: &[u8],
  fallback: &str,
) -> Result<T, ApiError> {
  let envelope: ApiEnvelope = match serde_json::from_slice(body) {
    Ok(envelope) => envelope,
    Err(e) if status.is_success() => return Err(ApiError::Decode(e.to_string())),
    Err(_) => {
      return Err(ApiError::Server {
        status: status.as_u16(),
        message: fallback.to_string(),
      })
    }
  };

  if !status.is_success() || !envelope.success {
    return Err(ApiError::Server {
      status: status.as_u16(),
      message: envelope
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string()),
    });
  }

  serde_json::from_value(envelope.data).map_err(|e| ApiError::Decode(format!("{}: {}", fallback, e)))
}

// ============================================================================
// Lists
// ============================================================================

/// Any paged list. The array field name differs per endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiList<T> {
  #[serde(alias = "items", alias = "posts", alias = "users", alias = "comments")]
  pub entries: Vec<T>,
  #[serde(default)]
  pub pagination: Pagination,
}

impl<T> ApiList<T> {
  pub fn into_page<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.entries.into_iter().map(f).collect(),
      pagination: self.pagination,
    }
  }
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
  #[serde(default)]
  pub id: u64,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub name: String,
  pub avatar_url: Option<String>,
}

impl From<ApiUser> for Author {
  fn from(user: ApiUser) -> Self {
    Author {
      id: user.id,
      username: user.username,
      name: user.name,
      avatar_url: user.avatar_url,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiCounts {
  pub likes: Option<u64>,
  pub comments: Option<u64>,
}

/// Posts come in several shapes depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPost {
  pub id: u64,
  #[serde(default, alias = "text", alias = "content")]
  pub caption: Option<String>,
  #[serde(default, alias = "mediaUrl", alias = "photoUrl")]
  pub image_url: Option<String>,
  #[serde(default, alias = "postedAt")]
  pub created_at: Option<String>,
  #[serde(default, alias = "user", alias = "profile")]
  pub author: Option<ApiUser>,
  #[serde(default)]
  pub counts: Option<ApiCounts>,
  pub like_count: Option<u64>,
  pub comment_count: Option<u64>,
  #[serde(default)]
  pub liked_by_me: bool,
  #[serde(default)]
  pub saved_by_me: bool,
}

impl ApiPost {
  pub fn into_post(self) -> Post {
    let counts = self.counts.unwrap_or_default();
    Post {
      id: self.id,
      caption: self.caption,
      image_url: self.image_url,
      created_at: self.created_at,
      author: self.author.map(Author::from),
      like_count: self.like_count.or(counts.likes).unwrap_or(0),
      comment_count: self.comment_count.or(counts.comments).unwrap_or(0),
      liked_by_me: self.liked_by_me,
      saved_by_me: self.saved_by_me,
    }
  }
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiLoginData {
  pub token: String,
  pub username: Option<String>,
  pub profile: Option<ApiUser>,
  pub user: Option<ApiUser>,
}

impl ApiLoginData {
  pub fn into_session(self) -> Session {
    let username = self
      .profile
      .map(|p| p.username)
      .or(self.user.map(|u| u.username))
      .or(self.username)
      .filter(|u| !u.is_empty());
    Session {
      token: self.token,
      username,
    }
  }
}

/// Registration may or may not sign the new user in.
#[derive(Debug, Default, Deserialize)]
pub struct ApiRegisterData {
  pub token: Option<String>,
  pub user: Option<ApiUser>,
}

impl ApiRegisterData {
  pub fn into_session(self, username: &str) -> Option<Session> {
    let token = self.token.filter(|t| !t.is_empty())?;
    let username = self
      .user
      .map(|u| u.username)
      .filter(|u| !u.is_empty())
      .unwrap_or_else(|| username.to_string());
    Some(Session {
      token,
      username: Some(username),
    })
  }
}
