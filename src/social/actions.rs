//! User actions, each one an optimistic mutation over the cached views.

use chrono::Utc;
use color_eyre::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::api::{
  ApiError, Author, Comment, FollowState, LikeState, Me, Page, PageRequest, Post, Profile,
  SaveState, SocialApi, UserSummary,
};
use crate::cache::{CacheStore, CacheValue, MemoryStore};
use crate::sync::{
  ActionKind, InFlight, MutationError, MutationPlan, MutationSlot, OptimisticUpdate, Synchronizer,
  ToggleState,
};

use super::keys;
use super::session::Credentials;

/// Page size used when asking the server whether a post is liked or saved
const LOOKUP_LIMIT: u32 = 50;

/// A mutation whose prediction is already visible.
///
/// [`Submitted::finish`] runs the network action and reconciles the cache.
/// Dropping it instead rolls the prediction back.
pub struct Submitted<R, S: CacheStore + 'static = MemoryStore> {
  in_flight: InFlight<S>,
  action: BoxFuture<'static, Result<R, ApiError>>,
}

impl<R, S: CacheStore + 'static> Submitted<R, S> {
  pub fn slot(&self) -> &MutationSlot {
    self.in_flight.slot()
  }

  pub async fn finish(self) -> Result<R, MutationError> {
    let Submitted { in_flight, action } = self;
    in_flight.complete(action).await
  }
}

/// Every mutation the client can perform.
pub struct Actions<S: CacheStore = MemoryStore> {
  api: Arc<dyn SocialApi>,
  sync: Synchronizer<S>,
  credentials: Credentials,
  /// Optimistic comments get negative ids until the server assigns one
  next_temp_id: Arc<AtomicI64>,
}

impl<S: CacheStore> Clone for Actions<S> {
  fn clone(&self) -> Self {
    Self {
      api: Arc::clone(&self.api),
      sync: self.sync.clone(),
      credentials: self.credentials.clone(),
      next_temp_id: Arc::clone(&self.next_temp_id),
    }
  }
}

impl<S: CacheStore + 'static> Actions<S> {
  pub fn new(api: Arc<dyn SocialApi>, sync: Synchronizer<S>, credentials: Credentials) -> Self {
    Self {
      api,
      sync,
      credentials,
      next_temp_id: Arc::new(AtomicI64::new(-1)),
    }
  }

  pub fn synchronizer(&self) -> &Synchronizer<S> {
    &self.sync
  }

  fn require_token(&self, action: &'static str) -> Result<String, MutationError> {
    self
      .credentials
      .token()
      .ok_or_else(|| self.sync.reject(ApiError::MissingCredential { action }))
  }

  fn submit<R, Fut>(&self, plan: MutationPlan, action: Fut) -> Result<Submitted<R, S>, MutationError>
  where
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
  {
    let in_flight = self.sync.begin(plan)?;
    Ok(Submitted {
      in_flight,
      action: action.boxed(),
    })
  }

  /// Refuse a toggle while either direction is still in flight.
  fn guard_toggle(&self, resource: &str, on: ActionKind, off: ActionKind) -> Result<(), MutationError> {
    for kind in [on, off] {
      let slot = MutationSlot::new(kind, resource);
      if self.sync.is_pending(&slot)? {
        return Err(MutationError::AlreadyPending(slot));
      }
    }
    Ok(())
  }

  /// Slot whose pending state a toggle should reflect.
  fn active_slot(&self, resource: &str, on: ActionKind, off: ActionKind) -> Result<MutationSlot> {
    let off = MutationSlot::new(off, resource);
    if self.sync.is_pending(&off)? {
      Ok(off)
    } else {
      Ok(MutationSlot::new(on, resource))
    }
  }

  pub fn like(&self, post_id: u64) -> Result<Submitted<LikeState, S>, MutationError> {
    self.set_liked(post_id, true)
  }

  pub fn unlike(&self, post_id: u64) -> Result<Submitted<LikeState, S>, MutationError> {
    self.set_liked(post_id, false)
  }

  fn set_liked(&self, post_id: u64, liked: bool) -> Result<Submitted<LikeState, S>, MutationError> {
    let token = self.require_token("like posts")?;
    let changes = self
      .like_state(post_id)?
      .map(|state| *state.visible() != liked)
      .unwrap_or(true);

    let api = self.api.clone();
    self.submit(like_plan(post_id, liked, changes), async move {
      if liked {
        api.like_post(post_id, &token).await
      } else {
        api.unlike_post(post_id, &token).await
      }
    })
  }

  /// Like or unlike depending on the current state.
  ///
  /// The cached flag decides when the post is in a loaded feed page;
  /// otherwise the server's list of liked posts is consulted.
  pub async fn toggle_like(&self, post_id: u64) -> Result<Submitted<LikeState, S>, MutationError> {
    let token = self.require_token("like posts")?;
    let resource = post_id.to_string();
    self.guard_toggle(&resource, ActionKind::Like, ActionKind::Unlike)?;

    let liked = match self.like_state(post_id)? {
      Some(state) => *state.visible(),
      None => {
        let api = self.api.clone();
        self
          .on_server(post_id, "liked", move |page| async move {
            api.my_likes(page, &token).await
          })
          .await?
      }
    };

    if liked {
      self.unlike(post_id)
    } else {
      self.like(post_id)
    }
  }

  pub fn save(&self, post_id: u64) -> Result<Submitted<SaveState, S>, MutationError> {
    self.set_saved(post_id, true)
  }

  pub fn unsave(&self, post_id: u64) -> Result<Submitted<SaveState, S>, MutationError> {
    self.set_saved(post_id, false)
  }

  fn set_saved(&self, post_id: u64, saved: bool) -> Result<Submitted<SaveState, S>, MutationError> {
    let token = self.require_token("save posts")?;
    let post = if saved { self.cached_post(post_id)? } else { None };

    let api = self.api.clone();
    self.submit(save_plan(post_id, saved, post), async move {
      if saved {
        api.save_post(post_id, &token).await
      } else {
        api.unsave_post(post_id, &token).await
      }
    })
  }

  /// Save or unsave after asking explicitly which one applies.
  ///
  /// Uses the cached `saved_by_me` flag, else the first page of saved
  /// posts. A post missing from a page that has more pages after it is
  /// ambiguous and reported as a conflict rather than guessed.
  pub async fn toggle_save(&self, post_id: u64) -> Result<Submitted<SaveState, S>, MutationError> {
    let token = self.require_token("save posts")?;
    let resource = post_id.to_string();
    self.guard_toggle(&resource, ActionKind::Save, ActionKind::Unsave)?;

    let saved = match self.save_state(post_id)? {
      Some(state) => *state.visible(),
      None => {
        let api = self.api.clone();
        self
          .on_server(post_id, "saved", move |page| async move {
            api.my_saved(page, &token).await
          })
          .await?
      }
    };

    if saved {
      self.unsave(post_id)
    } else {
      self.save(post_id)
    }
  }

  /// Whether `post_id` appears in a server-side list of posts.
  async fn on_server<F, Fut>(&self, post_id: u64, what: &str, list: F) -> Result<bool, MutationError>
  where
    F: FnOnce(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<Post>, ApiError>>,
  {
    let page = list(PageRequest::new(1, LOOKUP_LIMIT))
      .await
      .map_err(|e| self.sync.reject(e))?;

    if page.items.iter().any(|p| p.id == post_id) {
      Ok(true)
    } else if page.has_more() {
      Err(self.sync.reject(ApiError::Conflict(format!(
        "Cannot tell whether post {} is {}; load it first",
        post_id, what
      ))))
    } else {
      Ok(false)
    }
  }

  pub fn follow(&self, username: &str) -> Result<Submitted<FollowState, S>, MutationError> {
    self.set_following(username, true)
  }

  pub fn unfollow(&self, username: &str) -> Result<Submitted<FollowState, S>, MutationError> {
    self.set_following(username, false)
  }

  fn set_following(
    &self,
    username: &str,
    follow: bool,
  ) -> Result<Submitted<FollowState, S>, MutationError> {
    let token = self.require_token("follow users")?;
    let username = username.trim().trim_start_matches('@').to_string();
    if username.is_empty() {
      return Err(self.sync.reject(ApiError::EmptyInput { field: "Username" }));
    }

    let changes = self
      .follow_state(&username)?
      .map(|state| *state.visible() != follow)
      .unwrap_or(true);

    let api = self.api.clone();
    let plan = follow_plan(&username, follow, changes);
    self.submit(plan, async move {
      if follow {
        api.follow_user(&username, &token).await
      } else {
        api.unfollow_user(&username, &token).await
      }
    })
  }

  /// Post a comment. It shows up at the top of the first comments page
  /// with a temporary negative id until the refetch brings the real one.
  pub fn add_comment(&self, post_id: u64, text: &str) -> Result<Submitted<Comment, S>, MutationError> {
    let token = self.require_token("comment")?;
    let text = text.trim().to_string();
    if text.is_empty() {
      return Err(self.sync.reject(ApiError::EmptyInput { field: "Comment" }));
    }

    let username = self.credentials.username().unwrap_or_else(|| "you".to_string());
    let draft = Comment {
      id: self.next_temp_id.fetch_sub(1, Ordering::Relaxed),
      text: text.clone(),
      created_at: Utc::now().to_rfc3339(),
      author: Author {
        id: 0,
        name: username.clone(),
        username,
        avatar_url: None,
      },
      is_mine: true,
    };

    let api = self.api.clone();
    self.submit(add_comment_plan(post_id, draft), async move {
      api.create_comment(post_id, &text, &token).await
    })
  }

  pub fn delete_comment(&self, post_id: u64, comment_id: i64) -> Result<Submitted<(), S>, MutationError> {
    let token = self.require_token("delete comments")?;
    let api = self.api.clone();
    self.submit(delete_comment_plan(post_id, comment_id), async move {
      api.delete_comment(comment_id, &token).await
    })
  }

  pub fn delete_post(&self, post_id: u64) -> Result<Submitted<(), S>, MutationError> {
    let token = self.require_token("delete posts")?;
    let api = self.api.clone();
    self.submit(delete_post_plan(post_id), async move {
      api.delete_post(post_id, &token).await
    })
  }

  /// Liked flag of a post found in a cached feed page.
  pub fn like_state(&self, post_id: u64) -> Result<Option<ToggleState<bool>>> {
    let slot = self.active_slot(&post_id.to_string(), ActionKind::Like, ActionKind::Unlike)?;
    self.post_flag(&slot, post_id, |p| p.liked_by_me)
  }

  /// Saved flag of a post found in a cached feed page.
  pub fn save_state(&self, post_id: u64) -> Result<Option<ToggleState<bool>>> {
    let slot = self.active_slot(&post_id.to_string(), ActionKind::Save, ActionKind::Unsave)?;
    self.post_flag(&slot, post_id, |p| p.saved_by_me)
  }

  /// Follow flag from a cached profile.
  pub fn follow_state(&self, username: &str) -> Result<Option<ToggleState<bool>>> {
    let slot = self.active_slot(username, ActionKind::Follow, ActionKind::Unfollow)?;
    self
      .sync
      .toggle_state(&slot, &keys::profile(username), |p: &Profile| p.is_followed_by_me)
  }

  fn post_flag(
    &self,
    slot: &MutationSlot,
    post_id: u64,
    flag: fn(&Post) -> bool,
  ) -> Result<Option<ToggleState<bool>>> {
    for key in self.sync.cache().keys_matching(&keys::all(keys::FEED))? {
      let state = self.sync.toggle_state(slot, &key, |page: &Page<Post>| {
        page.items.iter().find(|p| p.id == post_id).map(flag)
      })?;
      if let Some(state) = state.and_then(|s| s.transpose()) {
        return Ok(Some(state));
      }
    }
    Ok(None)
  }

  /// A cached copy of the post, preferring the feed's personalised one.
  fn cached_post(&self, post_id: u64) -> Result<Option<Post>> {
    for resource in keys::POST_LISTS {
      for key in self.sync.cache().keys_matching(&keys::all(resource))? {
        if let Some(page) = self.sync.cache().peek::<Page<Post>>(&key)? {
          if let Some(post) = page.items.into_iter().find(|p| p.id == post_id) {
            return Ok(Some(post));
          }
        }
      }
    }
    Ok(None)
  }
}

fn adjust(count: &mut u64, up: bool) {
  if up {
    *count += 1;
  } else {
    *count = count.saturating_sub(1);
  }
}

/// Remove matching items from a page and keep its total in step.
fn remove_from_page<T>(page: &mut Page<T>, matches: impl Fn(&T) -> bool) {
  let before = page.items.len();
  page.items.retain(|item| !matches(item));
  let removed = (before - page.items.len()) as u64;
  page.pagination.total = page.pagination.total.saturating_sub(removed);
}

/// Apply the same edit to every cached page of each list in `lists`.
fn on_lists<T, F>(mut plan: MutationPlan, lists: &[&str], edit: F) -> MutationPlan
where
  T: CacheValue,
  F: Fn(&mut Page<T>) + Clone + Send + Sync + 'static,
{
  for resource in lists {
    plan = plan.update(OptimisticUpdate::modify_all(keys::all(resource), edit.clone()));
  }
  plan
}

fn invalidate_lists(mut plan: MutationPlan, lists: &[&str]) -> MutationPlan {
  for resource in lists {
    plan = plan.invalidate(keys::all(resource));
  }
  plan
}

fn like_plan(post_id: u64, liked: bool, changes: bool) -> MutationPlan {
  let kind = if liked { ActionKind::Like } else { ActionKind::Unlike };
  let mut plan = MutationPlan::new(MutationSlot::new(kind, post_id)).update(
    OptimisticUpdate::modify_all(keys::all(keys::FEED), move |page: &mut Page<Post>| {
      for post in page.items.iter_mut().filter(|p| p.id == post_id) {
        if post.liked_by_me != liked {
          post.liked_by_me = liked;
          adjust(&mut post.like_count, liked);
        }
      }
    }),
  );
  if changes {
    plan = plan.update(OptimisticUpdate::modify(
      keys::like_count(post_id),
      move |count: &mut u64| adjust(count, liked),
    ));
    // Flags in public lists are not ours, so only the count moves
    plan = on_lists(plan, &keys::PUBLIC_POST_LISTS, move |page: &mut Page<Post>| {
      for post in page.items.iter_mut().filter(|p| p.id == post_id) {
        adjust(&mut post.like_count, liked);
      }
    });
  }
  let plan = plan
    .invalidate(keys::all_of(keys::LIKE_COUNT, post_id))
    .invalidate(keys::all_of(keys::LIKERS, post_id));
  invalidate_lists(plan, &keys::POST_LISTS)
}

fn save_plan(post_id: u64, saved: bool, post: Option<Post>) -> MutationPlan {
  let kind = if saved { ActionKind::Save } else { ActionKind::Unsave };
  let plan = on_lists(
    MutationPlan::new(MutationSlot::new(kind, post_id)),
    &[keys::FEED],
    move |page: &mut Page<Post>| {
      for post in page.items.iter_mut().filter(|p| p.id == post_id) {
        post.saved_by_me = saved;
      }
    },
  );
  plan
    .update(OptimisticUpdate::modify_all(
      keys::all(keys::SAVED),
      move |page: &mut Page<Post>| {
        let present = page.items.iter().any(|p| p.id == post_id);
        match (&post, saved, present) {
          (Some(post), true, false) if page.pagination.page <= 1 => {
            page.items.insert(0, Post {
              saved_by_me: true,
              ..post.clone()
            });
            page.pagination.total += 1;
          }
          (_, false, true) => remove_from_page(page, |p| p.id == post_id),
          _ => {}
        }
      },
    ))
    .invalidate(keys::all(keys::FEED))
    .invalidate(keys::all(keys::SAVED))
}

fn follow_plan(username: &str, follow: bool, changes: bool) -> MutationPlan {
  let kind = if follow { ActionKind::Follow } else { ActionKind::Unfollow };
  let target = username.to_string();
  let plan = MutationPlan::new(MutationSlot::new(kind, username)).update(
    OptimisticUpdate::modify(keys::profile(username), move |profile: &mut Profile| {
      if profile.is_followed_by_me != follow {
        profile.is_followed_by_me = follow;
        adjust(&mut profile.counts.followers, follow);
      }
    }),
  );

  let mut plan = on_lists(plan, &keys::USER_LISTS, move |page: &mut Page<UserSummary>| {
    for user in page.items.iter_mut().filter(|u| u.username == target) {
      user.is_followed_by_me = follow;
    }
  });
  if changes {
    plan = plan.update(OptimisticUpdate::modify(keys::me(), move |me: &mut Me| {
      adjust(&mut me.stats.following, follow)
    }));
  }

  plan
    .invalidate(keys::all_of(keys::PROFILE, username))
    .invalidate(keys::all_of(keys::FOLLOWERS, username))
    .invalidate(keys::all(keys::FOLLOWING))
    .invalidate(keys::all(keys::USER_SEARCH))
    .invalidate(keys::all(keys::LIKERS))
    .invalidate(keys::all(keys::ME))
}

fn add_comment_plan(post_id: u64, draft: Comment) -> MutationPlan {
  let plan = MutationPlan::new(MutationSlot::new(ActionKind::AddComment, post_id))
    .update(OptimisticUpdate::modify_all(
      keys::all_of(keys::COMMENTS, post_id),
      move |page: &mut Page<Comment>| {
        if page.pagination.page <= 1 {
          page.items.insert(0, draft.clone());
        }
        page.pagination.total += 1;
      },
    ))
    .update(OptimisticUpdate::modify(
      keys::comment_total(post_id),
      |total: &mut u64| *total += 1,
    ));
  let plan = on_lists(plan, &keys::POST_LISTS, move |page: &mut Page<Post>| {
    for post in page.items.iter_mut().filter(|p| p.id == post_id) {
      post.comment_count += 1;
    }
  });
  invalidate_lists(plan, &keys::POST_LISTS)
    .invalidate(keys::all_of(keys::COMMENTS, post_id))
    .invalidate(keys::all_of(keys::COMMENT_TOTAL, post_id))
}

fn delete_comment_plan(post_id: u64, comment_id: i64) -> MutationPlan {
  let plan = MutationPlan::new(MutationSlot::new(ActionKind::DeleteComment, comment_id))
    .update(OptimisticUpdate::modify_all(
      keys::all_of(keys::COMMENTS, post_id),
      move |page: &mut Page<Comment>| remove_from_page(page, |c| c.id == comment_id),
    ))
    .update(OptimisticUpdate::modify(
      keys::comment_total(post_id),
      |total: &mut u64| adjust(total, false),
    ));
  let plan = on_lists(plan, &keys::POST_LISTS, move |page: &mut Page<Post>| {
    for post in page.items.iter_mut().filter(|p| p.id == post_id) {
      adjust(&mut post.comment_count, false);
    }
  });
  invalidate_lists(plan, &keys::POST_LISTS)
    .invalidate(keys::all_of(keys::COMMENTS, post_id))
    .invalidate(keys::all_of(keys::COMMENT_TOTAL, post_id))
}

fn delete_post_plan(post_id: u64) -> MutationPlan {
  let plan = on_lists(
    MutationPlan::new(MutationSlot::new(ActionKind::DeletePost, post_id)),
    &keys::POST_LISTS,
    move |page: &mut Page<Post>| remove_from_page(page, |p| p.id == post_id),
  );
  let plan = plan
    .update(OptimisticUpdate::modify_all(
      keys::all(keys::SAVED),
      move |page: &mut Page<Post>| remove_from_page(page, |p| p.id == post_id),
    ))
    .update(OptimisticUpdate::modify(keys::me(), |me: &mut Me| {
      adjust(&mut me.stats.posts, false)
    }));
  invalidate_lists(plan, &keys::POST_LISTS)
    .invalidate(keys::all(keys::SAVED))
    .invalidate(keys::all(keys::ME))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::FakeApi;
  use crate::cache::QueryCache;
  use crate::social::SocialClient;
  use crate::sync::{Level, Notification, Notifier};
  use tokio::sync::mpsc::UnboundedReceiver;

  struct Harness {
    api: Arc<FakeApi>,
    client: SocialClient,
    actions: Actions,
    notes: UnboundedReceiver<Notification>,
  }

  fn harness(api: FakeApi, token: Option<&str>) -> Harness {
    let api = Arc::new(api);
    let cache = QueryCache::in_memory();
    let credentials = Credentials::new(token.map(String::from));
    let (notifier, notes) = Notifier::channel();
    let sync = Synchronizer::new(cache.clone(), notifier);
    Harness {
      client: SocialClient::new(api.clone(), cache, credentials.clone()),
      actions: Actions::new(api.clone(), sync, credentials),
      api,
      notes,
    }
  }

  fn page() -> PageRequest {
    PageRequest::new(1, 10)
  }

  fn feed_post(h: &Harness, post_id: u64) -> Post {
    h.actions
      .cached_post(post_id)
      .unwrap()
      .expect("post in cached feed")
  }

  fn drain(notes: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut all = Vec::new();
    while let Ok(note) = notes.try_recv() {
      all.push(note);
    }
    all
  }

  #[tokio::test]
  async fn test_like_is_visible_before_server_and_converges() {
    let mut h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();
    h.client.like_count(7).await.unwrap();

    let submitted = h.actions.like(7).unwrap();
    let post = feed_post(&h, 7);
    assert_eq!((post.like_count, post.liked_by_me), (4, true));
    assert_eq!(h.client.like_count(7).await.unwrap().data, 4);
    assert_eq!(
      h.actions.like_state(7).unwrap(),
      Some(ToggleState::Pending {
        confirmed: false,
        predicted: true
      })
    );

    let state = submitted.finish().await.unwrap();
    assert_eq!(state.like_count, 4);
    assert_eq!(h.api.like_count(7), 4);
    let post = feed_post(&h, 7);
    assert_eq!((post.like_count, post.liked_by_me), (4, true));
    assert_eq!(h.actions.like_state(7).unwrap(), Some(ToggleState::Idle(true)));
    assert!(drain(&mut h.notes).is_empty());
  }

  #[tokio::test]
  async fn test_failed_toggle_after_like_reverts_to_last_confirmed() {
    let mut h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();

    h.actions.like(7).unwrap().finish().await.unwrap();

    h.api.fail("unlike_post");
    let second = h.actions.toggle_like(7).await.unwrap();
    assert_eq!(second.slot(), &MutationSlot::new(ActionKind::Unlike, 7));
    let post = feed_post(&h, 7);
    assert_eq!((post.like_count, post.liked_by_me), (3, false));

    let err = second.finish().await.unwrap_err();
    assert!(matches!(err, MutationError::Api(ApiError::Server { .. })));
    let post = feed_post(&h, 7);
    assert_eq!((post.like_count, post.liked_by_me), (4, true));

    let notes = drain(&mut h.notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Error);
    assert_eq!(notes[0].message, "unlike_post failed");
  }

  #[tokio::test]
  async fn test_failed_like_reverts_pre_click_values() {
    let mut h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();
    h.api.fail("like_post");

    let submitted = h.actions.like(7).unwrap();
    assert_eq!(feed_post(&h, 7).like_count, 4);
    submitted.finish().await.unwrap_err();

    let post = feed_post(&h, 7);
    assert_eq!((post.like_count, post.liked_by_me), (3, false));
    assert_eq!(drain(&mut h.notes).len(), 1);
  }

  #[tokio::test]
  async fn test_duplicate_like_is_ignored() {
    let mut h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();

    let first = h.actions.like(7).unwrap();
    let second = h.actions.like(7);
    assert!(matches!(second, Err(MutationError::AlreadyPending(_))));
    assert!(matches!(
      h.actions.toggle_like(7).await,
      Err(MutationError::AlreadyPending(_))
    ));
    assert_eq!(feed_post(&h, 7).like_count, 4);

    first.finish().await.unwrap();
    assert_eq!(h.api.call_count("like_post"), 1);
    assert_eq!(h.api.like_count(7), 4);
    assert!(drain(&mut h.notes).is_empty());
  }

  #[tokio::test]
  async fn test_missing_token_rejected_locally() {
    let mut h = harness(FakeApi::new().with_post(7, 3, false), None);

    let err = h.actions.like(7).err().unwrap();
    assert!(matches!(err, MutationError::Api(ApiError::MissingCredential { .. })));
    assert!(h.api.calls().is_empty());

    let notes = drain(&mut h.notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, "Please login to like posts");
  }

  #[tokio::test]
  async fn test_empty_comment_rejected_locally() {
    let mut h = harness(FakeApi::new().with_post(7, 0, false), Some("t"));
    h.client.comments(7, page()).await.unwrap();

    let err = h.actions.add_comment(7, "   ").err().unwrap();
    assert!(matches!(err, MutationError::Api(ApiError::EmptyInput { .. })));
    assert_eq!(h.api.call_count("create_comment"), 0);
    assert_eq!(drain(&mut h.notes)[0].message, "Comment cannot be empty");
    assert!(h.client.comments(7, page()).await.unwrap().data.items.is_empty());
  }

  #[tokio::test]
  async fn test_add_comment_shows_draft_then_server_comment() {
    let h = harness(
      FakeApi::new().with_post(7, 0, false).with_comment(7, 1, "first"),
      Some("t"),
    );
    h.client.comments(7, page()).await.unwrap();
    h.client.comment_total(7).await.unwrap();

    let submitted = h.actions.add_comment(7, "  nice shot ").unwrap();
    let visible = h.client.comments(7, page()).await.unwrap().data;
    assert_eq!(visible.items.len(), 2);
    assert!(visible.items[0].id < 0);
    assert_eq!(visible.items[0].text, "nice shot");
    assert_eq!(visible.pagination.total, 2);
    assert_eq!(h.client.comment_total(7).await.unwrap().data, 2);

    let created = submitted.finish().await.unwrap();
    let visible = h.client.comments(7, page()).await.unwrap().data;
    assert_eq!(visible.items[0].id, created.id);
    assert!(visible.items.iter().all(|c| c.id > 0));
    assert_eq!(h.client.comment_total(7).await.unwrap().data, 2);
  }

  #[tokio::test]
  async fn test_failed_comment_delete_restores_position_and_count() {
    let h = harness(
      FakeApi::new()
        .with_post(7, 0, false)
        .with_comment(7, 1, "a")
        .with_comment(7, 2, "b")
        .with_comment(7, 3, "c"),
      Some("t"),
    );
    h.client.comments(7, page()).await.unwrap();
    h.client.comment_total(7).await.unwrap();
    h.api.fail("delete_comment");

    let submitted = h.actions.delete_comment(7, 2).unwrap();
    let visible = h.client.comments(7, page()).await.unwrap().data;
    let ids: Vec<i64> = visible.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(visible.pagination.total, 2);
    assert_eq!(h.client.comment_total(7).await.unwrap().data, 2);

    submitted.finish().await.unwrap_err();
    let visible = h.client.comments(7, page()).await.unwrap().data;
    let ids: Vec<i64> = visible.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(visible.pagination.total, 3);
    assert_eq!(h.client.comment_total(7).await.unwrap().data, 3);
  }

  #[tokio::test]
  async fn test_toggle_save_uses_cached_flag() {
    let h = harness(FakeApi::new().with_post(7, 0, false).with_saved(7), Some("t"));
    h.client.feed(page()).await.unwrap();

    let submitted = h.actions.toggle_save(7).await.unwrap();
    assert_eq!(submitted.slot(), &MutationSlot::new(ActionKind::Unsave, 7));
    assert_eq!(
      h.actions.save_state(7).unwrap(),
      Some(ToggleState::Pending {
        confirmed: true,
        predicted: false
      })
    );
    assert!(!submitted.finish().await.unwrap().saved);
    assert_eq!(h.api.call_count("my_saved"), 0);
  }

  #[tokio::test]
  async fn test_toggle_save_asks_server_when_uncached() {
    let h = harness(FakeApi::new().with_post(7, 0, false).with_saved(7), Some("t"));

    let submitted = h.actions.toggle_save(7).await.unwrap();
    assert_eq!(submitted.slot(), &MutationSlot::new(ActionKind::Unsave, 7));
    assert_eq!(h.api.call_count("my_saved"), 1);
    submitted.finish().await.unwrap();
  }

  #[tokio::test]
  async fn test_toggle_save_ambiguous_state_is_conflict() {
    let mut api = FakeApi::new();
    for id in 1..=60 {
      api = api.with_post(id, 0, false).with_saved(id);
    }
    let mut h = harness(api.with_post(100, 0, false), Some("t"));

    let err = h.actions.toggle_save(100).await.err().unwrap();
    assert!(matches!(err, MutationError::Api(ApiError::Conflict(_))));
    assert_eq!(h.api.call_count("save_post"), 0);
    assert_eq!(h.api.call_count("unsave_post"), 0);
    assert_eq!(drain(&mut h.notes).len(), 1);
  }

  #[tokio::test]
  async fn test_save_inserts_into_first_saved_page() {
    let h = harness(FakeApi::new().with_post(7, 0, false), Some("t"));
    h.client.feed(page()).await.unwrap();
    h.client.saved(page()).await.unwrap();

    let submitted = h.actions.save(7).unwrap();
    let saved = h.client.saved(page()).await.unwrap().data;
    assert_eq!(saved.items.len(), 1);
    assert!(saved.items[0].saved_by_me);

    submitted.finish().await.unwrap();
    let saved = h.client.saved(page()).await.unwrap().data;
    assert_eq!(saved.items[0].id, 7);
  }

  #[tokio::test]
  async fn test_follow_updates_profile_and_lists() {
    let h = harness(FakeApi::new().with_user("bob", false), Some("t"));
    h.client.profile("bob").await.unwrap();
    h.client.search_users("bo", page()).await.unwrap();

    let submitted = h.actions.follow("@bob").unwrap();
    let profile = h.client.profile("bob").await.unwrap().data;
    assert!(profile.is_followed_by_me);
    assert_eq!(profile.counts.followers, 1);
    let found = h.client.search_users("bo", page()).await.unwrap().data;
    assert!(found.items[0].is_followed_by_me);
    assert!(h.actions.follow_state("bob").unwrap().unwrap().is_pending());

    submitted.finish().await.unwrap();
    assert_eq!(h.actions.follow_state("bob").unwrap(), Some(ToggleState::Idle(true)));
  }

  #[tokio::test]
  async fn test_failed_delete_post_restores_feed() {
    let h = harness(
      FakeApi::new().with_post(7, 0, false).with_post(8, 0, false),
      Some("t"),
    );
    h.client.feed(page()).await.unwrap();
    h.api.fail("delete_post");

    let submitted = h.actions.delete_post(7).unwrap();
    let feed = h.client.feed(page()).await.unwrap().data;
    assert_eq!(feed.items.len(), 1);
    assert_eq!(feed.pagination.total, 1);

    submitted.finish().await.unwrap_err();
    let feed = h.client.feed(page()).await.unwrap().data;
    let ids: Vec<u64> = feed.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![7, 8]);
  }

  #[tokio::test]
  async fn test_dropped_submission_rolls_back() {
    let h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();

    drop(h.actions.like(7).unwrap());
    assert_eq!(feed_post(&h, 7).like_count, 3);
    assert_eq!(h.api.call_count("like_post"), 0);
  }

  #[tokio::test]
  async fn test_follow_confirms_cached_search_page() {
    let h = harness(FakeApi::new().with_user("bob", false), Some("t"));
    h.client.search_users("bo", page()).await.unwrap();

    h.actions.follow("bob").unwrap().finish().await.unwrap();
    assert_eq!(h.api.call_count("search_users"), 2);

    let key = keys::user_search("bo", page());
    let entry = h.actions.synchronizer().cache().entry(&key).unwrap().unwrap();
    assert!(!entry.is_stale());
    assert!(!entry.has_pending());
    let confirmed: Page<UserSummary> = h
      .actions
      .synchronizer()
      .cache()
      .peek_confirmed(&key)
      .unwrap()
      .unwrap();
    assert!(confirmed.items[0].is_followed_by_me);
  }

  #[tokio::test]
  async fn test_follow_counts_toward_own_stats_once() {
    let h = harness(FakeApi::new().with_user("bob", true), Some("t"));
    h.client.profile("bob").await.unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.following, 1);

    let submitted = h.actions.follow("bob").unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.following, 1);
    submitted.finish().await.unwrap();

    let submitted = h.actions.unfollow("bob").unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.following, 0);
    submitted.finish().await.unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.following, 0);
  }

  #[tokio::test]
  async fn test_like_moves_count_in_public_lists() {
    let h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();
    h.client.explore(page()).await.unwrap();
    h.client.user_posts("ann", page()).await.unwrap();

    let submitted = h.actions.like(7).unwrap();
    let explore = h.client.explore(page()).await.unwrap().data;
    assert_eq!(explore.items[0].like_count, 4);
    assert!(!explore.items[0].liked_by_me);
    assert_eq!(h.client.user_posts("ann", page()).await.unwrap().data.items[0].like_count, 4);

    submitted.finish().await.unwrap();
    assert_eq!(h.api.call_count("global_posts"), 2);
    assert_eq!(h.client.explore(page()).await.unwrap().data.items[0].like_count, 4);
  }

  #[tokio::test]
  async fn test_repeated_like_leaves_public_counts_alone() {
    let h = harness(FakeApi::new().with_post(7, 3, true), Some("t"));
    h.client.feed(page()).await.unwrap();
    h.client.explore(page()).await.unwrap();

    let submitted = h.actions.like(7).unwrap();
    assert_eq!(h.client.explore(page()).await.unwrap().data.items[0].like_count, 3);
    assert_eq!(feed_post(&h, 7).like_count, 3);
    submitted.finish().await.unwrap();
    assert_eq!(h.api.like_count(7), 3);
  }

  #[tokio::test]
  async fn test_refetch_picks_up_likes_from_elsewhere() {
    let h = harness(FakeApi::new().with_post(7, 3, false), Some("t"));
    h.client.feed(page()).await.unwrap();

    let submitted = h.actions.like(7).unwrap();
    h.api.external_like(7);
    assert_eq!(feed_post(&h, 7).like_count, 4);

    submitted.finish().await.unwrap();
    assert_eq!(feed_post(&h, 7).like_count, 5);
  }

  #[tokio::test]
  async fn test_delete_post_clears_every_list_and_own_stats() {
    let h = harness(
      FakeApi::new().with_post(7, 0, false).with_post(8, 0, false),
      Some("t"),
    );
    h.client.feed(page()).await.unwrap();
    h.client.explore(page()).await.unwrap();
    h.client.user_likes("ann", page()).await.unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.posts, 2);

    let submitted = h.actions.delete_post(7).unwrap();
    let explore = h.client.explore(page()).await.unwrap().data;
    let ids: Vec<u64> = explore.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![8]);
    assert_eq!(explore.pagination.total, 1);
    assert_eq!(h.client.me().await.unwrap().data.stats.posts, 1);

    submitted.finish().await.unwrap();
    assert_eq!(h.client.me().await.unwrap().data.stats.posts, 1);
    assert_eq!(h.client.explore(page()).await.unwrap().data.items.len(), 1);
    assert_eq!(h.api.call_count("me"), 2);
  }

  #[tokio::test]
  async fn test_save_from_explore_only_post() {
    let h = harness(FakeApi::new().with_post(7, 2, false), Some("t"));
    h.client.explore(page()).await.unwrap();
    h.client.saved(page()).await.unwrap();

    let submitted = h.actions.save(7).unwrap();
    let saved = h.client.saved(page()).await.unwrap().data;
    assert_eq!(saved.items[0].id, 7);
    assert!(saved.items[0].saved_by_me);
    submitted.finish().await.unwrap();
    assert_eq!(h.client.saved(page()).await.unwrap().data.items.len(), 1);
  }
}

