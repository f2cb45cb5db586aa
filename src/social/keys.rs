//! Cache keys for every resource the client reads.

use crate::api::PageRequest;
use crate::cache::{CacheKey, KeyPrefix};

pub const FEED: &str = "feed";
pub const LIKE_COUNT: &str = "like-count";
pub const COMMENT_TOTAL: &str = "comment-total";
pub const COMMENTS: &str = "comments";
pub const LIKERS: &str = "likers";
pub const FOLLOWERS: &str = "followers";
pub const FOLLOWING: &str = "following";
pub const USER_SEARCH: &str = "user-search";
pub const PROFILE: &str = "profile";
pub const SAVED: &str = "saved";
pub const EXPLORE: &str = "explore";
pub const USER_POSTS: &str = "user-posts";
pub const USER_LIKES: &str = "user-likes";
pub const ME: &str = "me";

fn paged(key: CacheKey, page: PageRequest) -> CacheKey {
  key.with_param("page", page.page).with_param("limit", page.limit)
}

pub fn feed(page: PageRequest) -> CacheKey {
  paged(CacheKey::new(FEED), page)
}

pub fn like_count(post_id: u64) -> CacheKey {
  CacheKey::new(LIKE_COUNT).with_id(post_id)
}

pub fn comment_total(post_id: u64) -> CacheKey {
  CacheKey::new(COMMENT_TOTAL).with_id(post_id)
}

pub fn comments(post_id: u64, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(COMMENTS).with_id(post_id), page)
}

pub fn likers(post_id: u64, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(LIKERS).with_id(post_id), page)
}

pub fn followers(username: &str, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(FOLLOWERS).with_id(username), page)
}

pub fn following(username: &str, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(FOLLOWING).with_id(username), page)
}

pub fn user_search(query: &str, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(USER_SEARCH).with_param("q", query), page)
}

pub fn profile(username: &str) -> CacheKey {
  CacheKey::new(PROFILE).with_id(username)
}

pub fn saved(page: PageRequest) -> CacheKey {
  paged(CacheKey::new(SAVED), page)
}

/// Global post list
pub fn explore(page: PageRequest) -> CacheKey {
  paged(CacheKey::new(EXPLORE), page)
}

pub fn user_posts(username: &str, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(USER_POSTS).with_id(username), page)
}

pub fn user_likes(username: &str, page: PageRequest) -> CacheKey {
  paged(CacheKey::new(USER_LIKES).with_id(username), page)
}

/// The logged-in user's profile and stats
pub fn me() -> CacheKey {
  CacheKey::new(ME)
}

/// Every cached page of a resource, e.g. all feed pages
pub fn all(resource: &str) -> KeyPrefix {
  KeyPrefix::resource(resource)
}

/// Every cached page of one resource instance, e.g. all comment pages of a post
pub fn all_of(resource: &str, id: impl ToString) -> KeyPrefix {
  KeyPrefix::resource(resource).with_id(id)
}

/// Resources holding user lists whose `is_followed_by_me` flags follow a
/// follow/unfollow
pub const USER_LISTS: [&str; 4] = [FOLLOWERS, FOLLOWING, USER_SEARCH, LIKERS];

/// Post lists read without a token. Their like and save flags are never
/// personalised, so only the feed can tell whether a post is liked.
pub const PUBLIC_POST_LISTS: [&str; 3] = [EXPLORE, USER_POSTS, USER_LIKES];

/// Every cached list that can hold a given post, saved posts aside
pub const POST_LISTS: [&str; 4] = [FEED, EXPLORE, USER_POSTS, USER_LIKES];
