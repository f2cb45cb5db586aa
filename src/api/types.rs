use serde::{Deserialize, Serialize};

/// Pagination block returned by every list endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u32,
}

/// Page/limit pair for list reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub page: u32,
  pub limit: u32,
}

impl PageRequest {
  pub fn new(page: u32, limit: u32) -> Self {
    Self { page, limit }
  }

  /// Smallest possible read, used when only `pagination.total` matters
  pub fn count_only() -> Self {
    Self { page: 1, limit: 1 }
  }
}

/// One page of a list read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub pagination: Pagination,
}

impl<T> Page<T> {
  pub fn empty() -> Self {
    Self {
      items: Vec::new(),
      pagination: Pagination::default(),
    }
  }

  pub fn total(&self) -> u64 {
    self.pagination.total
  }

  pub fn has_more(&self) -> bool {
    self.pagination.page < self.pagination.total_pages
  }
}

/// Author of a post or comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
  pub id: u64,
  pub username: String,
  pub name: String,
  pub avatar_url: Option<String>,
}

/// Post as shown in feeds and grids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: u64,
  pub caption: Option<String>,
  pub image_url: Option<String>,
  pub created_at: Option<String>,
  pub author: Option<Author>,
  pub like_count: u64,
  pub comment_count: u64,
  pub liked_by_me: bool,
  pub saved_by_me: bool,
}

/// Comment on a post. Optimistic comments carry a negative id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: i64,
  pub text: String,
  pub created_at: String,
  pub author: Author,
  #[serde(default)]
  pub is_mine: bool,
}

/// Entry of a user list (likers, followers, search results)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
  pub id: u64,
  pub username: String,
  pub name: String,
  pub avatar_url: Option<String>,
  #[serde(default)]
  pub is_followed_by_me: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCounts {
  #[serde(default)]
  pub post: u64,
  #[serde(default)]
  pub followers: u64,
  #[serde(default)]
  pub following: u64,
  #[serde(default)]
  pub likes: u64,
}

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id: u64,
  pub name: String,
  pub username: String,
  #[serde(default)]
  pub bio: Option<String>,
  #[serde(default)]
  pub avatar_url: Option<String>,
  #[serde(default)]
  pub counts: ProfileCounts,
  #[serde(default)]
  pub is_me: bool,
  #[serde(default)]
  pub is_followed_by_me: bool,
}

/// The logged-in user's own profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeProfile {
  pub id: u64,
  pub name: String,
  pub username: String,
  pub email: String,
  pub phone: Option<String>,
  pub bio: Option<String>,
  pub avatar_url: Option<String>,
  pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeStats {
  pub posts: u64,
  pub followers: u64,
  pub following: u64,
  pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Me {
  pub profile: MeProfile,
  pub stats: MeStats,
}

/// Sign-up form. `name` falls back to the username when left blank.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
  pub name: String,
  pub username: String,
  pub email: String,
  pub phone: String,
  pub password: String,
}

/// Credentials returned by login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub token: String,
  pub username: Option<String>,
}

/// Server answer to like/unlike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
  pub liked: bool,
  pub like_count: u64,
}

/// Server answer to follow/unfollow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowState {
  pub following: bool,
}

/// Server answer to save/unsave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
  pub saved: bool,
}
