//! Read-through client: every read goes through the query cache.

use color_eyre::Result;
use std::sync::Arc;

use crate::api::{
  ApiError, Comment, Me, Page, PageRequest, Post, Profile, Registration, Session, SocialApi,
  UserSummary,
};
use crate::cache::{CacheResult, CacheStore, MemoryStore, QueryCache};

use super::keys;
use super::session::Credentials;

/// Social API with transparent caching.
///
/// Reads are cached per key and page; a fresh entry is served from memory,
/// a stale one is refetched, and a failed refetch falls back to the cached
/// value.
pub struct SocialClient<S: CacheStore = MemoryStore> {
  api: Arc<dyn SocialApi>,
  cache: QueryCache<S>,
  credentials: Credentials,
}

impl<S: CacheStore> Clone for SocialClient<S> {
  fn clone(&self) -> Self {
    Self {
      api: Arc::clone(&self.api),
      cache: self.cache.clone(),
      credentials: self.credentials.clone(),
    }
  }
}

impl<S: CacheStore + 'static> SocialClient<S> {
  pub fn new(api: Arc<dyn SocialApi>, cache: QueryCache<S>, credentials: Credentials) -> Self {
    Self {
      api,
      cache,
      credentials,
    }
  }

  pub fn credentials(&self) -> &Credentials {
    &self.credentials
  }

  fn require_token(&self, action: &'static str) -> Result<String> {
    Ok(
      self
        .credentials
        .token()
        .ok_or(ApiError::MissingCredential { action })?,
    )
  }

  /// Log in and keep the session for later calls.
  ///
  /// The cache is cleared since every personalised flag belonged to the
  /// previous user.
  pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
    if email.trim().is_empty() {
      return Err(ApiError::EmptyInput { field: "Email" }.into());
    }
    let session = self.api.login(email.trim(), password).await?;
    self.cache.clear()?;
    self.credentials.set(session.clone());
    Ok(session)
  }

  /// Create an account. When the server signs the new user in, the
  /// session is kept exactly as after [`SocialClient::login`].
  pub async fn register(&self, mut registration: Registration) -> Result<Option<Session>> {
    for (field, value) in [
      ("Username", &mut registration.username),
      ("Email", &mut registration.email),
      ("Phone", &mut registration.phone),
    ] {
      *value = value.trim().to_string();
      if value.is_empty() {
        return Err(ApiError::EmptyInput { field }.into());
      }
    }
    if registration.password.is_empty() {
      return Err(ApiError::EmptyInput { field: "Password" }.into());
    }
    registration.name = registration.name.trim().to_string();
    if registration.name.is_empty() {
      registration.name = registration.username.clone();
    }

    let session = self.api.register(&registration).await?;
    if let Some(session) = &session {
      self.cache.clear()?;
      self.credentials.set(session.clone());
    }
    Ok(session)
  }

  pub async fn me(&self) -> Result<CacheResult<Me>> {
    let token = self.require_token("view your profile")?;
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::me(), move || {
        let api = api.clone();
        let token = token.clone();
        async move { Ok(api.me(&token).await?) }
      })
      .await
  }

  pub async fn feed(&self, page: PageRequest) -> Result<CacheResult<Page<Post>>> {
    let token = self.require_token("view your feed")?;
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::feed(page), move || {
        let api = api.clone();
        let token = token.clone();
        async move { Ok(api.feed(page, &token).await?) }
      })
      .await
  }

  /// Everyone's posts, newest first. Read anonymously.
  pub async fn explore(&self, page: PageRequest) -> Result<CacheResult<Page<Post>>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::explore(page), move || {
        let api = api.clone();
        async move { Ok(api.global_posts(page).await?) }
      })
      .await
  }

  pub async fn user_posts(&self, username: &str, page: PageRequest) -> Result<CacheResult<Page<Post>>> {
    let api = self.api.clone();
    let username = username.to_string();
    self
      .cache
      .fetch(&keys::user_posts(&username, page), move || {
        let api = api.clone();
        let username = username.clone();
        async move { Ok(api.user_posts(&username, page).await?) }
      })
      .await
  }

  /// Posts a user has liked.
  pub async fn user_likes(&self, username: &str, page: PageRequest) -> Result<CacheResult<Page<Post>>> {
    let api = self.api.clone();
    let username = username.to_string();
    self
      .cache
      .fetch(&keys::user_likes(&username, page), move || {
        let api = api.clone();
        let username = username.clone();
        async move { Ok(api.user_likes(&username, page).await?) }
      })
      .await
  }

  pub async fn comments(&self, post_id: u64, page: PageRequest) -> Result<CacheResult<Page<Comment>>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::comments(post_id, page), move || {
        let api = api.clone();
        async move { Ok(api.post_comments(post_id, page).await?) }
      })
      .await
  }

  pub async fn likers(&self, post_id: u64, page: PageRequest) -> Result<CacheResult<Page<UserSummary>>> {
    let api = self.api.clone();
    let token = self.credentials.token();
    self
      .cache
      .fetch(&keys::likers(post_id, page), move || {
        let api = api.clone();
        let token = token.clone();
        async move { Ok(api.post_likes(post_id, page, token.as_deref()).await?) }
      })
      .await
  }

  /// Like count from the likers list total.
  pub async fn like_count(&self, post_id: u64) -> Result<CacheResult<u64>> {
    let api = self.api.clone();
    let token = self.credentials.token();
    self
      .cache
      .fetch(&keys::like_count(post_id), move || {
        let api = api.clone();
        let token = token.clone();
        async move { Ok(api.post_like_count(post_id, token.as_deref()).await?) }
      })
      .await
  }

  pub async fn comment_total(&self, post_id: u64) -> Result<CacheResult<u64>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::comment_total(post_id), move || {
        let api = api.clone();
        async move { Ok(api.post_comment_count(post_id).await?) }
      })
      .await
  }

  pub async fn followers(
    &self,
    username: &str,
    page: PageRequest,
  ) -> Result<CacheResult<Page<UserSummary>>> {
    let api = self.api.clone();
    let token = self.credentials.token();
    let username = username.to_string();
    self
      .cache
      .fetch(&keys::followers(&username, page), move || {
        let api = api.clone();
        let token = token.clone();
        let username = username.clone();
        async move {
          Ok(
            api
              .user_followers(&username, page, token.as_deref())
              .await?,
          )
        }
      })
      .await
  }

  pub async fn following(
    &self,
    username: &str,
    page: PageRequest,
  ) -> Result<CacheResult<Page<UserSummary>>> {
    let api = self.api.clone();
    let token = self.credentials.token();
    let username = username.to_string();
    self
      .cache
      .fetch(&keys::following(&username, page), move || {
        let api = api.clone();
        let token = token.clone();
        let username = username.clone();
        async move {
          Ok(
            api
              .user_following(&username, page, token.as_deref())
              .await?,
          )
        }
      })
      .await
  }

  pub async fn search_users(
    &self,
    query: &str,
    page: PageRequest,
  ) -> Result<CacheResult<Page<UserSummary>>> {
    let api = self.api.clone();
    let query = query.trim().to_string();
    self
      .cache
      .fetch(&keys::user_search(&query, page), move || {
        let api = api.clone();
        let query = query.clone();
        async move { Ok(api.search_users(&query, page).await?) }
      })
      .await
  }

  pub async fn saved(&self, page: PageRequest) -> Result<CacheResult<Page<Post>>> {
    let token = self.require_token("view saved posts")?;
    let api = self.api.clone();
    self
      .cache
      .fetch(&keys::saved(page), move || {
        let api = api.clone();
        let token = token.clone();
        async move { Ok(api.my_saved(page, &token).await?) }
      })
      .await
  }

  pub async fn profile(&self, username: &str) -> Result<CacheResult<Profile>> {
    let api = self.api.clone();
    let token = self.credentials.token();
    let username = username.to_string();
    self
      .cache
      .fetch(&keys::profile(&username), move || {
        let api = api.clone();
        let token = token.clone();
        let username = username.clone();
        async move { Ok(api.user_profile(&username, token.as_deref()).await?) }
      })
      .await
  }
}
