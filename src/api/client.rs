use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;

use super::api_types::{decode_envelope, ApiList, ApiLoginData, ApiPost, ApiRegisterData};
use super::error::ApiError;
use super::types::{
  Comment, FollowState, LikeState, Me, Page, PageRequest, Post, Profile, Registration, SaveState,
  Session, UserSummary,
};

/// Remote social API, grouped as toggles, list reads, count reads and
/// create/delete actions.
///
/// Authenticated calls take the bearer token explicitly; optional-token
/// reads personalise flags such as `is_followed_by_me` when one is given.
#[async_trait]
pub trait SocialApi: Send + Sync {
  async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError>;
  /// Create an account. Some servers sign the new user in straight away.
  async fn register(&self, registration: &Registration) -> Result<Option<Session>, ApiError>;
  async fn me(&self, token: &str) -> Result<Me, ApiError>;
  async fn user_profile(&self, username: &str, token: Option<&str>) -> Result<Profile, ApiError>;

  // List reads
  async fn feed(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError>;
  async fn global_posts(&self, page: PageRequest) -> Result<Page<Post>, ApiError>;
  async fn user_posts(&self, username: &str, page: PageRequest) -> Result<Page<Post>, ApiError>;
  async fn user_likes(&self, username: &str, page: PageRequest) -> Result<Page<Post>, ApiError>;
  async fn my_likes(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError>;
  async fn my_saved(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError>;
  async fn search_users(&self, query: &str, page: PageRequest)
    -> Result<Page<UserSummary>, ApiError>;
  async fn post_likes(
    &self,
    post_id: u64,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError>;
  async fn post_comments(&self, post_id: u64, page: PageRequest)
    -> Result<Page<Comment>, ApiError>;
  async fn user_followers(
    &self,
    username: &str,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError>;
  async fn user_following(
    &self,
    username: &str,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError>;

  // Toggles
  async fn like_post(&self, post_id: u64, token: &str) -> Result<LikeState, ApiError>;
  async fn unlike_post(&self, post_id: u64, token: &str) -> Result<LikeState, ApiError>;
  async fn follow_user(&self, username: &str, token: &str) -> Result<FollowState, ApiError>;
  async fn unfollow_user(&self, username: &str, token: &str) -> Result<FollowState, ApiError>;
  async fn save_post(&self, post_id: u64, token: &str) -> Result<SaveState, ApiError>;
  async fn unsave_post(&self, post_id: u64, token: &str) -> Result<SaveState, ApiError>;

  // Create/delete
  async fn create_comment(&self, post_id: u64, text: &str, token: &str)
    -> Result<Comment, ApiError>;
  async fn delete_comment(&self, comment_id: i64, token: &str) -> Result<(), ApiError>;
  async fn delete_post(&self, post_id: u64, token: &str) -> Result<(), ApiError>;

  // Count reads: the list's pagination total is the authoritative aggregate
  async fn post_like_count(&self, post_id: u64, token: Option<&str>) -> Result<u64, ApiError> {
    Ok(
      self
        .post_likes(post_id, PageRequest::count_only(), token)
        .await?
        .total(),
    )
  }

  async fn post_comment_count(&self, post_id: u64) -> Result<u64, ApiError> {
    Ok(
      self
        .post_comments(post_id, PageRequest::count_only())
        .await?
        .total(),
    )
  }
}

/// HTTP client for the social API
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
    let base = Url::parse(&config.base_url).map_err(|e| ApiError::Url(e.to_string()))?;
    if base.cannot_be_a_base() {
      return Err(ApiError::Url(format!("{} cannot be a base URL", base)));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self { http, base })
  }

  /// Build an endpoint URL from path segments (each one percent-encoded).
  fn endpoint(&self, segments: &[&str], page: Option<PageRequest>) -> Result<Url, ApiError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Url(self.base.to_string()))?
      .pop_if_empty()
      .extend(segments);
    if let Some(page) = page {
      url
        .query_pairs_mut()
        .append_pair("page", &page.page.to_string())
        .append_pair("limit", &page.limit.to_string());
    }
    Ok(url)
  }

  fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
    let builder = self.http.request(method, url).header(ACCEPT, "*/*");
    match token {
      Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
      None => builder,
    }
  }

  async fn send<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
    fallback: &str,
  ) -> Result<T, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    debug!(url = %response.url(), %status, "api response");
    let body = response.bytes().await?;
    decode_envelope(status, &body, fallback)
  }

  async fn get_list<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    page: PageRequest,
    token: Option<&str>,
    fallback: &str,
  ) -> Result<ApiList<T>, ApiError> {
    let url = self.endpoint(segments, Some(page))?;
    self.send(self.request(Method::GET, url, token), fallback).await
  }

  async fn get_posts(
    &self,
    segments: &[&str],
    page: PageRequest,
    token: Option<&str>,
    fallback: &str,
  ) -> Result<Page<Post>, ApiError> {
    let list: ApiList<ApiPost> = self.get_list(segments, page, token, fallback).await?;
    Ok(list.into_page(ApiPost::into_post))
  }

  async fn get_users(
    &self,
    segments: &[&str],
    page: PageRequest,
    token: Option<&str>,
    fallback: &str,
  ) -> Result<Page<UserSummary>, ApiError> {
    let list: ApiList<UserSummary> = self.get_list(segments, page, token, fallback).await?;
    Ok(list.into_page(|u| u))
  }

  async fn toggle<T: DeserializeOwned>(
    &self,
    method: Method,
    segments: &[&str],
    token: &str,
    fallback: &str,
  ) -> Result<T, ApiError> {
    let url = self.endpoint(segments, None)?;
    let mut request = self.request(method.clone(), url, Some(token));
    if method == Method::POST {
      request = request.body("");
    }
    self.send(request, fallback).await
  }
}

#[async_trait]
impl SocialApi for ApiClient {
  async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
    let url = self.endpoint(&["auth", "login"], None)?;
    let body = serde_json::json!({ "email": email, "password": password });
    let data: ApiLoginData = self
      .send(self.request(Method::POST, url, None).json(&body), "Login failed")
      .await?;
    Ok(data.into_session())
  }

  async fn register(&self, registration: &Registration) -> Result<Option<Session>, ApiError> {
    let url = self.endpoint(&["auth", "register"], None)?;
    let data: Option<ApiRegisterData> = self
      .send(
        self.request(Method::POST, url, None).json(registration),
        "Registration failed",
      )
      .await?;
    Ok(data.and_then(|d| d.into_session(&registration.username)))
  }

  async fn me(&self, token: &str) -> Result<Me, ApiError> {
    let url = self.endpoint(&["me"], None)?;
    self
      .send(self.request(Method::GET, url, Some(token)), "Failed to fetch profile")
      .await
  }

  async fn user_profile(&self, username: &str, token: Option<&str>) -> Result<Profile, ApiError> {
    let url = self.endpoint(&["users", username], None)?;
    self
      .send(self.request(Method::GET, url, token), "Failed to load user")
      .await
  }

  async fn feed(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["feed"], page, Some(token), "Failed to fetch feed")
      .await
  }

  async fn global_posts(&self, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["posts"], page, None, "Failed to fetch global posts")
      .await
  }

  async fn user_posts(&self, username: &str, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["users", username, "posts"], page, None, "Failed to fetch user posts")
      .await
  }

  async fn user_likes(&self, username: &str, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["users", username, "likes"], page, None, "Failed to fetch likes")
      .await
  }

  async fn my_likes(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["me", "likes"], page, Some(token), "Failed to fetch my likes")
      .await
  }

  async fn my_saved(&self, page: PageRequest, token: &str) -> Result<Page<Post>, ApiError> {
    self
      .get_posts(&["me", "saved"], page, Some(token), "Failed to fetch saved posts")
      .await
  }

  async fn search_users(
    &self,
    query: &str,
    page: PageRequest,
  ) -> Result<Page<UserSummary>, ApiError> {
    let mut url = self.endpoint(&["users", "search"], Some(page))?;
    url.query_pairs_mut().append_pair("q", query);
    let list: ApiList<UserSummary> = self
      .send(self.request(Method::GET, url, None), "Failed to search users")
      .await?;
    Ok(list.into_page(|u| u))
  }

  async fn post_likes(
    &self,
    post_id: u64,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    let id = post_id.to_string();
    self
      .get_users(&["posts", id.as_str(), "likes"], page, token, "Failed to fetch post likes")
      .await
  }

  async fn post_comments(
    &self,
    post_id: u64,
    page: PageRequest,
  ) -> Result<Page<Comment>, ApiError> {
    let id = post_id.to_string();
    let list: ApiList<Comment> = self
      .get_list(&["posts", id.as_str(), "comments"], page, None, "Failed to fetch comments")
      .await?;
    Ok(list.into_page(|c| c))
  }

  async fn user_followers(
    &self,
    username: &str,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    self
      .get_users(&["users", username, "followers"], page, token, "Failed to fetch followers")
      .await
  }

  async fn user_following(
    &self,
    username: &str,
    page: PageRequest,
    token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    self
      .get_users(&["users", username, "following"], page, token, "Failed to fetch following")
      .await
  }

  async fn like_post(&self, post_id: u64, token: &str) -> Result<LikeState, ApiError> {
    let id = post_id.to_string();
    self
      .toggle(Method::POST, &["posts", id.as_str(), "like"], token, "Failed to like post")
      .await
  }

  async fn unlike_post(&self, post_id: u64, token: &str) -> Result<LikeState, ApiError> {
    let id = post_id.to_string();
    self
      .toggle(Method::DELETE, &["posts", id.as_str(), "like"], token, "Failed to unlike post")
      .await
  }

  async fn follow_user(&self, username: &str, token: &str) -> Result<FollowState, ApiError> {
    self
      .toggle(Method::POST, &["follow", username], token, "Failed to follow user")
      .await
  }

  async fn unfollow_user(&self, username: &str, token: &str) -> Result<FollowState, ApiError> {
    self
      .toggle(Method::DELETE, &["follow", username], token, "Failed to unfollow user")
      .await
  }

  async fn save_post(&self, post_id: u64, token: &str) -> Result<SaveState, ApiError> {
    let id = post_id.to_string();
    self
      .toggle(Method::POST, &["posts", id.as_str(), "save"], token, "Failed to save post")
      .await
  }

  async fn unsave_post(&self, post_id: u64, token: &str) -> Result<SaveState, ApiError> {
    let id = post_id.to_string();
    self
      .toggle(Method::DELETE, &["posts", id.as_str(), "save"], token, "Failed to unsave post")
      .await
  }

  async fn create_comment(
    &self,
    post_id: u64,
    text: &str,
    token: &str,
  ) -> Result<Comment, ApiError> {
    let id = post_id.to_string();
    let url = self.endpoint(&["posts", id.as_str(), "comments"], None)?;
    let body = serde_json::json!({ "text": text });
    self
      .send(
        self.request(Method::POST, url, Some(token)).json(&body),
        "Failed to create comment",
      )
      .await
  }

  async fn delete_comment(&self, comment_id: i64, token: &str) -> Result<(), ApiError> {
    let id = comment_id.to_string();
    let url = self.endpoint(&["comments", id.as_str()], None)?;
    let _: serde_json::Value = self
      .send(self.request(Method::DELETE, url, Some(token)), "Failed to delete comment")
      .await?;
    Ok(())
  }

  async fn delete_post(&self, post_id: u64, token: &str) -> Result<(), ApiError> {
    let id = post_id.to_string();
    let url = self.endpoint(&["posts", id.as_str()], None)?;
    let _: serde_json::Value = self
      .send(self.request(Method::DELETE, url, Some(token)), "Failed to delete post")
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> ApiClient {
    ApiClient::new(&ApiConfig {
      base_url: base.to_string(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  #[test]
  fn test_endpoint_encodes_segments() {
    let c = client("https://example.com/api");
    let url = c.endpoint(&["users", "ann b", "posts"], Some(PageRequest::new(2, 20))).unwrap();
    assert_eq!(url.as_str(), "https://example.com/api/users/ann%20b/posts?page=2&limit=20");
  }

  #[test]
  fn test_endpoint_with_trailing_slash_base() {
    let c = client("https://example.com/api/");
    let url = c.endpoint(&["posts", "7", "like"], None).unwrap();
    assert_eq!(url.as_str(), "https://example.com/api/posts/7/like");
  }

  #[test]
  fn test_rejects_non_base_url() {
    let result = ApiClient::new(&ApiConfig {
      base_url: "mailto:someone@example.com".to_string(),
      timeout_secs: 5,
    });
    assert!(matches!(result, Err(ApiError::Url(_))));
  }
}
