//! In-memory `SocialApi` used by tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::client::SocialApi;
use super::error::ApiError;
use super::types::{
  Author, Comment, FollowState, LikeState, Me, MeProfile, MeStats, Page, PageRequest, Pagination,
  Post, Profile, ProfileCounts, Registration, SaveState, Session, UserSummary,
};

#[derive(Debug, Clone)]
struct FakePost {
  like_count: u64,
  liked: bool,
  saved: bool,
  comments: Vec<Comment>,
}

#[derive(Default)]
struct FakeState {
  posts: BTreeMap<u64, FakePost>,
  users: Vec<UserSummary>,
  following: HashSet<String>,
  failing: HashSet<&'static str>,
  calls: Vec<String>,
  next_comment_id: i64,
}

/// Scripted backend. Operations named in `fail` return a server error.
#[derive(Default)]
pub struct FakeApi {
  state: Mutex<FakeState>,
  latency: Mutex<Option<Duration>>,
}

pub fn author(username: &str) -> Author {
  Author {
    id: 1,
    username: username.to_string(),
    name: username.to_string(),
    avatar_url: None,
  }
}

fn page_of<T: Clone>(all: &[T], page: PageRequest) -> Page<T> {
  let limit = page.limit.max(1) as usize;
  let start = (page.page.saturating_sub(1) as usize) * limit;
  let items = all.iter().skip(start).take(limit).cloned().collect();
  let total = all.len() as u64;
  Page {
    items,
    pagination: Pagination {
      page: page.page,
      limit: page.limit,
      total,
      total_pages: total.div_ceil(limit as u64) as u32,
    },
  }
}

impl FakeApi {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(FakeState {
        next_comment_id: 1000,
        ..FakeState::default()
      }),
      latency: Mutex::new(None),
    }
  }

  pub fn with_post(self, id: u64, like_count: u64, liked: bool) -> Self {
    self.state.lock().unwrap().posts.insert(
      id,
      FakePost {
        like_count,
        liked,
        saved: false,
        comments: Vec::new(),
      },
    );
    self
  }

  pub fn with_saved(self, id: u64) -> Self {
    if let Some(post) = self.state.lock().unwrap().posts.get_mut(&id) {
      post.saved = true;
    }
    self
  }

  pub fn with_comment(self, post_id: u64, id: i64, text: &str) -> Self {
    if let Some(post) = self.state.lock().unwrap().posts.get_mut(&post_id) {
      post.comments.push(Comment {
        id,
        text: text.to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        author: author("ann"),
        is_mine: true,
      });
    }
    self
  }

  pub fn with_user(self, username: &str, followed: bool) -> Self {
    let mut state = self.state.lock().unwrap();
    let id = state.users.len() as u64 + 1;
    state.users.push(UserSummary {
      id,
      username: username.to_string(),
      name: username.to_string(),
      avatar_url: None,
      is_followed_by_me: followed,
    });
    if followed {
      state.following.insert(username.to_string());
    }
    drop(state);
    self
  }

  pub fn fail(&self, op: &'static str) {
    self.state.lock().unwrap().failing.insert(op);
  }

  pub fn recover(&self, op: &'static str) {
    self.state.lock().unwrap().failing.remove(op);
  }

  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap() = Some(latency);
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self, op: &str) -> usize {
    self.calls().iter().filter(|c| c.as_str() == op).count()
  }

  pub fn like_count(&self, id: u64) -> u64 {
    self.state.lock().unwrap().posts[&id].like_count
  }

  /// Another client likes the post behind our back.
  pub fn external_like(&self, id: u64) {
    if let Some(post) = self.state.lock().unwrap().posts.get_mut(&id) {
      post.like_count += 1;
    }
  }

  async fn enter(&self, op: &'static str) -> Result<(), ApiError> {
    let latency = *self.latency.lock().unwrap();
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }
    let mut state = self.state.lock().unwrap();
    state.calls.push(op.to_string());
    if state.failing.contains(op) {
      return Err(ApiError::Server {
        status: 500,
        message: format!("{} failed", op),
      });
    }
    Ok(())
  }

  fn posts(&self) -> Vec<Post> {
    let state = self.state.lock().unwrap();
    state
      .posts
      .iter()
      .map(|(id, p)| Post {
        id: *id,
        caption: Some(format!("post {}", id)),
        image_url: None,
        created_at: None,
        author: Some(author("ann")),
        like_count: p.like_count,
        comment_count: p.comments.len() as u64,
        liked_by_me: p.liked,
        saved_by_me: p.saved,
      })
      .collect()
  }

  /// Posts as an anonymous reader sees them.
  fn public_posts(&self) -> Vec<Post> {
    self
      .posts()
      .into_iter()
      .map(|p| Post {
        liked_by_me: false,
        saved_by_me: false,
        ..p
      })
      .collect()
  }

  fn users(&self) -> Vec<UserSummary> {
    let state = self.state.lock().unwrap();
    state
      .users
      .iter()
      .map(|u| UserSummary {
        is_followed_by_me: state.following.contains(&u.username),
        ..u.clone()
      })
      .collect()
  }

  fn with_post_mut<R>(&self, id: u64, f: impl FnOnce(&mut FakePost) -> R) -> Result<R, ApiError> {
    let mut state = self.state.lock().unwrap();
    state.posts.get_mut(&id).map(f).ok_or(ApiError::Server {
      status: 404,
      message: "Post not found".to_string(),
    })
  }
}

#[async_trait]
impl SocialApi for FakeApi {
  async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
    self.enter("login").await?;
    if password.is_empty() {
      return Err(ApiError::Server {
        status: 401,
        message: "Invalid credentials".to_string(),
      });
    }
    Ok(Session {
      token: format!("token-{}", email),
      username: email.split('@').next().map(String::from),
    })
  }

  async fn register(&self, registration: &Registration) -> Result<Option<Session>, ApiError> {
    self.enter("register").await?;
    let mut state = self.state.lock().unwrap();
    if state.users.iter().any(|u| u.username == registration.username) {
      return Err(ApiError::Server {
        status: 409,
        message: "Username already taken".to_string(),
      });
    }
    let id = state.users.len() as u64 + 1;
    state.users.push(UserSummary {
      id,
      username: registration.username.clone(),
      name: registration.name.clone(),
      avatar_url: None,
      is_followed_by_me: false,
    });
    Ok(Some(Session {
      token: format!("token-{}", registration.username),
      username: Some(registration.username.clone()),
    }))
  }

  async fn me(&self, _token: &str) -> Result<Me, ApiError> {
    self.enter("me").await?;
    let (posts, following) = {
      let state = self.state.lock().unwrap();
      (state.posts.len() as u64, state.following.len() as u64)
    };
    Ok(Me {
      profile: MeProfile {
        id: 1,
        name: "Ann".to_string(),
        username: "ann".to_string(),
        email: "ann@example.com".to_string(),
        phone: None,
        bio: None,
        avatar_url: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
      },
      stats: MeStats {
        posts,
        following,
        ..MeStats::default()
      },
    })
  }

  async fn user_profile(&self, username: &str, _token: Option<&str>) -> Result<Profile, ApiError> {
    self.enter("user_profile").await?;
    let following = self.state.lock().unwrap().following.contains(username);
    Ok(Profile {
      id: 2,
      name: username.to_string(),
      username: username.to_string(),
      bio: None,
      avatar_url: None,
      counts: ProfileCounts {
        followers: following as u64,
        ..ProfileCounts::default()
      },
      is_me: false,
      is_followed_by_me: following,
    })
  }

  async fn feed(&self, page: PageRequest, _token: &str) -> Result<Page<Post>, ApiError> {
    self.enter("feed").await?;
    Ok(page_of(&self.posts(), page))
  }

  async fn global_posts(&self, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self.enter("global_posts").await?;
    Ok(page_of(&self.public_posts(), page))
  }

  async fn user_posts(&self, _username: &str, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self.enter("user_posts").await?;
    Ok(page_of(&self.public_posts(), page))
  }

  async fn user_likes(&self, _username: &str, page: PageRequest) -> Result<Page<Post>, ApiError> {
    self.enter("user_likes").await?;
    let liked: Vec<Post> = self
      .posts()
      .into_iter()
      .filter(|p| p.liked_by_me)
      .map(|p| Post {
        liked_by_me: false,
        saved_by_me: false,
        ..p
      })
      .collect();
    Ok(page_of(&liked, page))
  }

  async fn my_likes(&self, page: PageRequest, _token: &str) -> Result<Page<Post>, ApiError> {
    self.enter("my_likes").await?;
    let liked: Vec<Post> = self.posts().into_iter().filter(|p| p.liked_by_me).collect();
    Ok(page_of(&liked, page))
  }

  async fn my_saved(&self, page: PageRequest, _token: &str) -> Result<Page<Post>, ApiError> {
    self.enter("my_saved").await?;
    let saved: Vec<Post> = self.posts().into_iter().filter(|p| p.saved_by_me).collect();
    Ok(page_of(&saved, page))
  }

  async fn search_users(
    &self,
    query: &str,
    page: PageRequest,
  ) -> Result<Page<UserSummary>, ApiError> {
    self.enter("search_users").await?;
    let found: Vec<UserSummary> = self
      .users()
      .into_iter()
      .filter(|u| u.username.contains(query))
      .collect();
    Ok(page_of(&found, page))
  }

  async fn post_likes(
    &self,
    post_id: u64,
    page: PageRequest,
    _token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    self.enter("post_likes").await?;
    let count = self.with_post_mut(post_id, |p| p.like_count)? as usize;
    let users = self.users();
    let likers: Vec<UserSummary> = (0..count)
      .map(|i| users.get(i).cloned().unwrap_or_else(|| UserSummary {
        id: 100 + i as u64,
        username: format!("user{}", i),
        name: format!("User {}", i),
        avatar_url: None,
        is_followed_by_me: false,
      }))
      .collect();
    Ok(page_of(&likers, page))
  }

  async fn post_comments(
    &self,
    post_id: u64,
    page: PageRequest,
  ) -> Result<Page<Comment>, ApiError> {
    self.enter("post_comments").await?;
    let comments = self.with_post_mut(post_id, |p| p.comments.clone())?;
    Ok(page_of(&comments, page))
  }

  async fn user_followers(
    &self,
    _username: &str,
    page: PageRequest,
    _token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    self.enter("user_followers").await?;
    Ok(page_of(&self.users(), page))
  }

  async fn user_following(
    &self,
    _username: &str,
    page: PageRequest,
    _token: Option<&str>,
  ) -> Result<Page<UserSummary>, ApiError> {
    self.enter("user_following").await?;
    Ok(page_of(&self.users(), page))
  }

  async fn like_post(&self, post_id: u64, _token: &str) -> Result<LikeState, ApiError> {
    self.enter("like_post").await?;
    self.with_post_mut(post_id, |p| {
      if !p.liked {
        p.liked = true;
        p.like_count += 1;
      }
      LikeState {
        liked: true,
        like_count: p.like_count,
      }
    })
  }

  async fn unlike_post(&self, post_id: u64, _token: &str) -> Result<LikeState, ApiError> {
    self.enter("unlike_post").await?;
    self.with_post_mut(post_id, |p| {
      if p.liked {
        p.liked = false;
        p.like_count = p.like_count.saturating_sub(1);
      }
      LikeState {
        liked: false,
        like_count: p.like_count,
      }
    })
  }

  async fn follow_user(&self, username: &str, _token: &str) -> Result<FollowState, ApiError> {
    self.enter("follow_user").await?;
    self
      .state
      .lock()
      .unwrap()
      .following
      .insert(username.to_string());
    Ok(FollowState { following: true })
  }

  async fn unfollow_user(&self, username: &str, _token: &str) -> Result<FollowState, ApiError> {
    self.enter("unfollow_user").await?;
    self.state.lock().unwrap().following.remove(username);
    Ok(FollowState { following: false })
  }

  async fn save_post(&self, post_id: u64, _token: &str) -> Result<SaveState, ApiError> {
    self.enter("save_post").await?;
    self.with_post_mut(post_id, |p| {
      p.saved = true;
      SaveState { saved: true }
    })
  }

  async fn unsave_post(&self, post_id: u64, _token: &str) -> Result<SaveState, ApiError> {
    self.enter("unsave_post").await?;
    self.with_post_mut(post_id, |p| {
      p.saved = false;
      SaveState { saved: false }
    })
  }

  async fn create_comment(
    &self,
    post_id: u64,
    text: &str,
    _token: &str,
  ) -> Result<Comment, ApiError> {
    self.enter("create_comment").await?;
    let id = {
      let mut state = self.state.lock().unwrap();
      state.next_comment_id += 1;
      state.next_comment_id
    };
    let comment = Comment {
      id,
      text: text.to_string(),
      created_at: "2024-01-02T00:00:00Z".to_string(),
      author: author("ann"),
      is_mine: true,
    };
    let stored = comment.clone();
    self.with_post_mut(post_id, move |p| p.comments.insert(0, stored))?;
    Ok(comment)
  }

  async fn delete_comment(&self, comment_id: i64, _token: &str) -> Result<(), ApiError> {
    self.enter("delete_comment").await?;
    let mut state = self.state.lock().unwrap();
    for post in state.posts.values_mut() {
      post.comments.retain(|c| c.id != comment_id);
    }
    Ok(())
  }

  async fn delete_post(&self, post_id: u64, _token: &str) -> Result<(), ApiError> {
    self.enter("delete_post").await?;
    self.state.lock().unwrap().posts.remove(&post_id);
    Ok(())
  }
}
