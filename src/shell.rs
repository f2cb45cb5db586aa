//! Interactive line shell: reads commands, prints cached views, and runs
//! mutations optimistically in the background.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::{
  ApiClient, Comment, LikeState, Me, Page, Post, Profile, Registration, SaveState, SocialApi,
  UserSummary,
};
use crate::cache::{CacheResult, CacheSource, QueryCache};
use crate::commands::{self, ParseError, Request, COMMANDS};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::social::{Actions, Credentials, SocialClient, Submitted};
use crate::sync::{Level, MutationError, Notification, Notifier, Synchronizer};

/// Finished mutations listed by `pending`
const RECENT_SHOWN: usize = 5;

pub struct Shell {
  config: Config,
  client: SocialClient,
  actions: Actions,
  notices: Option<mpsc::UnboundedReceiver<Notification>>,
  /// Event sender for background tasks
  event_tx: mpsc::UnboundedSender<Event>,
  should_quit: bool,
}

impl Shell {
  pub fn new(config: Config, token: Option<String>) -> Result<Self> {
    let api: Arc<dyn SocialApi> = Arc::new(ApiClient::new(&config.api)?);
    Ok(Self::with_api(config, api, token))
  }

  pub fn with_api(config: Config, api: Arc<dyn SocialApi>, token: Option<String>) -> Self {
    let cache = QueryCache::in_memory().with_stale_time(config.stale_time());
    let credentials = Credentials::new(token);
    let (notifier, notices) = Notifier::channel();
    let sync = Synchronizer::new(cache.clone(), notifier);
    let (tx, _rx) = mpsc::unbounded_channel();

    Self {
      client: SocialClient::new(api.clone(), cache, credentials.clone()),
      actions: Actions::new(api, sync, credentials),
      config,
      notices: Some(notices),
      event_tx: tx,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let notices = self
      .notices
      .take()
      .ok_or_else(|| eyre!("Shell is already running"))?;
    let mut events = EventHandler::new(notices);
    self.event_tx = events.sender();

    println!("feedsync: type `help` for commands");
    if self.client.credentials().token().is_none() {
      println!("not logged in; use `login <email> <password>` or set FEEDSYNC_TOKEN");
    }

    while !self.should_quit {
      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    info!("shell exiting");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Input(line) => self.handle_line(&line),
      Event::Notice(notice) => println!("{}", render_notice(&notice)),
      Event::Output(text) => println!("{}", text),
      Event::Eof => self.should_quit = true,
    }
  }

  fn handle_line(&mut self, line: &str) {
    let request = match commands::parse(line) {
      Ok(request) => request,
      Err(ParseError::Empty) => return,
      Err(ParseError::Unknown { word, suggestions }) => {
        if suggestions.is_empty() {
          println!("unknown command `{}`", word);
        } else {
          println!("unknown command `{}`; did you mean: {}", word, suggestions.join(", "));
        }
        return;
      }
      Err(ParseError::Usage(cmd)) => {
        println!("usage: {}", cmd.usage);
        return;
      }
    };
    debug!(?request, "dispatch");
    self.dispatch(request);
  }

  fn dispatch(&mut self, request: Request) {
    match request {
      Request::Feed { page } => {
        let client = self.client.clone();
        let page = self.config.feed.page(page);
        self.spawn_output(async move { Some(show(client.feed(page).await, render_posts)) });
      }
      Request::Explore { page } => {
        let client = self.client.clone();
        let page = self.config.feed.page(page);
        self.spawn_output(async move { Some(show(client.explore(page).await, render_posts)) });
      }
      Request::UserPosts { user, page } => {
        let client = self.client.clone();
        let page = self.config.feed.page(page);
        self.spawn_output(async move {
          Some(show(client.user_posts(&user, page).await, render_posts))
        });
      }
      Request::UserLikes { user, page } => {
        let client = self.client.clone();
        let page = self.config.feed.page(page);
        self.spawn_output(async move {
          Some(show(client.user_likes(&user, page).await, render_posts))
        });
      }
      Request::Me => {
        let client = self.client.clone();
        self.spawn_output(async move { Some(show(client.me().await, render_me)) });
      }
      Request::Saved { page } => {
        let client = self.client.clone();
        let page = self.config.feed.page(page);
        self.spawn_output(async move { Some(show(client.saved(page).await, render_posts)) });
      }
      Request::Comments { post, page } => {
        let client = self.client.clone();
        let page = self.config.comments.page(page);
        self.spawn_output(async move {
          Some(show(client.comments(post, page).await, render_comments))
        });
      }
      Request::Likers { post, page } => {
        let client = self.client.clone();
        let page = self.config.comments.page(page);
        self.spawn_output(async move { Some(show(client.likers(post, page).await, render_users)) });
      }
      Request::Followers { user, page } => {
        let client = self.client.clone();
        let page = self.config.comments.page(page);
        self.spawn_output(async move {
          Some(show(client.followers(&user, page).await, render_users))
        });
      }
      Request::Following { user, page } => {
        let client = self.client.clone();
        let page = self.config.comments.page(page);
        self.spawn_output(async move {
          Some(show(client.following(&user, page).await, render_users))
        });
      }
      Request::Search { query, page } => {
        let client = self.client.clone();
        let page = self.config.comments.page(page);
        self.spawn_output(async move {
          Some(show(client.search_users(&query, page).await, render_users))
        });
      }
      Request::Profile { user } => {
        let client = self.client.clone();
        self.spawn_output(async move { Some(show(client.profile(&user).await, render_profile)) });
      }
      Request::Like { post } => self.toggle_like(post),
      Request::Unlike { post } => {
        let submitted = self.actions.unlike(post);
        self.submit(submitted, move |state| {
          format!("post {}: unliked ({} likes)", post, state.like_count)
        });
      }
      Request::Save { post } => self.toggle_save(post),
      Request::Comment { post, text } => {
        let submitted = self.actions.add_comment(post, &text);
        self.submit(submitted, move |comment| {
          format!("post {}: comment #{} posted", post, comment.id)
        });
      }
      Request::Uncomment { post, comment } => {
        let submitted = self.actions.delete_comment(post, comment);
        self.submit(submitted, move |_| format!("post {}: comment #{} deleted", post, comment));
      }
      Request::Follow { user } => {
        let submitted = self.actions.follow(&user);
        self.submit(submitted, move |_| format!("following @{}", user));
      }
      Request::Unfollow { user } => {
        let submitted = self.actions.unfollow(&user);
        self.submit(submitted, move |_| format!("unfollowed @{}", user));
      }
      Request::Remove { post } => {
        let submitted = self.actions.delete_post(post);
        self.submit(submitted, move |_| format!("post {} deleted", post));
      }
      Request::Pending => self.show_pending(),
      Request::Login { email, password } => {
        let client = self.client.clone();
        self.spawn_output(async move {
          Some(match client.login(&email, &password).await {
            Ok(session) => format!(
              "logged in as {}",
              session.username.unwrap_or(email)
            ),
            Err(e) => format!("login failed: {}", e),
          })
        });
      }
      Request::Register {
        username,
        email,
        phone,
        password,
        name,
      } => {
        let client = self.client.clone();
        let registration = Registration {
          name,
          username,
          email,
          phone,
          password,
        };
        self.spawn_output(async move {
          Some(match client.register(registration).await {
            Ok(Some(session)) => format!(
              "registered and logged in as {}",
              session.username.unwrap_or_default()
            ),
            Ok(None) => "registered; now `login <email> <password>`".to_string(),
            Err(e) => format!("registration failed: {}", e),
          })
        });
      }
      Request::Help => {
        for cmd in COMMANDS {
          println!("  {:<28} {}", cmd.usage, cmd.description);
        }
      }
      Request::Quit => self.should_quit = true,
    }
  }

  /// Decide from the cached flag right away when possible, so the
  /// prediction lands in dispatch order; otherwise ask the server first.
  fn toggle_like(&mut self, post: u64) {
    let describe = move |state: LikeState| {
      let verb = if state.liked { "liked" } else { "unliked" };
      format!("post {}: {} ({} likes)", post, verb, state.like_count)
    };

    match self.actions.like_state(post) {
      Ok(Some(state)) if state.is_pending() => println!("post {}: like already in progress", post),
      Ok(Some(state)) => {
        let submitted = if *state.visible() {
          self.actions.unlike(post)
        } else {
          self.actions.like(post)
        };
        self.submit(submitted, describe);
      }
      _ => {
        let actions = self.actions.clone();
        self.spawn_output(async move {
          match actions.toggle_like(post).await {
            Ok(submitted) => finish(submitted, describe).await,
            Err(e) => report(&e),
          }
        });
      }
    }
  }

  fn toggle_save(&mut self, post: u64) {
    let describe = move |state: SaveState| {
      let verb = if state.saved { "saved" } else { "unsaved" };
      format!("post {}: {}", post, verb)
    };

    match self.actions.save_state(post) {
      Ok(Some(state)) if state.is_pending() => println!("post {}: save already in progress", post),
      Ok(Some(state)) => {
        let submitted = if *state.visible() {
          self.actions.unsave(post)
        } else {
          self.actions.save(post)
        };
        self.submit(submitted, describe);
      }
      _ => {
        let actions = self.actions.clone();
        self.spawn_output(async move {
          match actions.toggle_save(post).await {
            Ok(submitted) => finish(submitted, describe).await,
            Err(e) => report(&e),
          }
        });
      }
    }
  }

  /// The prediction is already in the cache; the network half runs in a task.
  fn submit<R, F>(&self, submitted: Result<Submitted<R>, MutationError>, describe: F)
  where
    R: Send + 'static,
    F: FnOnce(R) -> String + Send + 'static,
  {
    match submitted {
      Ok(submitted) => {
        println!("{} sent", submitted.slot());
        self.spawn_output(finish(submitted, describe));
      }
      Err(e) => {
        if let Some(message) = report(&e) {
          println!("{}", message);
        }
      }
    }
  }

  fn show_pending(&self) {
    let sync = self.actions.synchronizer();
    match sync.pending() {
      Ok(pending) if pending.is_empty() => println!("nothing pending"),
      Ok(pending) => {
        for mutation in pending {
          let keys: Vec<String> = mutation.keys().map(|k| k.to_string()).collect();
          println!(
            "  #{} {} since {} [{}]",
            mutation.id,
            mutation.slot,
            mutation.started_at.format("%H:%M:%S"),
            keys.join(", ")
          );
        }
      }
      Err(e) => println!("error: {}", e),
    }

    match sync.history() {
      Ok(history) if !history.is_empty() => {
        println!("recent:");
        for mutation in history.iter().take(RECENT_SHOWN) {
          println!("  #{} {} {:?}", mutation.id, mutation.slot, mutation.status);
        }
      }
      Ok(_) => {}
      Err(e) => println!("error: {}", e),
    }
  }

  fn spawn_output<F>(&self, task: F)
  where
    F: Future<Output = Option<String>> + Send + 'static,
  {
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      if let Some(text) = task.await {
        let _ = tx.send(Event::Output(text));
      }
    });
  }
}

async fn finish<R, F>(submitted: Submitted<R>, describe: F) -> Option<String>
where
  F: FnOnce(R) -> String,
{
  match submitted.finish().await {
    Ok(value) => Some(describe(value)),
    Err(e) => report(&e),
  }
}

/// Message for a mutation error, unless the notifier already showed it.
fn report(err: &MutationError) -> Option<String> {
  match err {
    MutationError::Api(_) => None,
    MutationError::AlreadyPending(slot) => Some(format!("{} already in progress", slot)),
    MutationError::Cache(_) => Some(format!("error: {}", err)),
  }
}

fn show<T>(result: Result<CacheResult<T>>, render: fn(&T) -> String) -> String {
  match result {
    Ok(result) => match source_note(result.source) {
      Some(note) => format!("{}\n({})", render(&result.data), note),
      None => render(&result.data),
    },
    Err(e) => format!("error: {}", e),
  }
}

fn source_note(source: CacheSource) -> Option<&'static str> {
  match source {
    CacheSource::Network | CacheSource::CacheFresh => None,
    CacheSource::Offline => Some("offline, showing cached data"),
    CacheSource::Superseded => Some("showing local changes not yet confirmed"),
  }
}

fn render_notice(notice: &Notification) -> String {
  match notice.level {
    Level::Error => format!("! {}", notice.message),
    Level::Info => format!("* {}", notice.message),
  }
}

fn page_footer<T>(page: &Page<T>) -> String {
  format!(
    "page {}/{} ({} total)",
    page.pagination.page,
    page.pagination.total_pages.max(1),
    page.pagination.total
  )
}

fn render_posts(page: &Page<Post>) -> String {
  if page.items.is_empty() {
    return "no posts".to_string();
  }
  let mut lines: Vec<String> = page
    .items
    .iter()
    .map(|p| {
      let author = p.author.as_ref().map(|a| a.username.as_str()).unwrap_or("?");
      format!(
        "#{:<6} @{:<16} {}{} {:>4} likes {:>4} comments  {}",
        p.id,
        author,
        if p.liked_by_me { "♥" } else { " " },
        if p.saved_by_me { "★" } else { " " },
        p.like_count,
        p.comment_count,
        p.caption.as_deref().unwrap_or("")
      )
    })
    .collect();
  lines.push(page_footer(page));
  lines.join("\n")
}

fn render_comments(page: &Page<Comment>) -> String {
  if page.items.is_empty() {
    return "no comments".to_string();
  }
  let mut lines: Vec<String> = page
    .items
    .iter()
    .map(|c| {
      let id = if c.id < 0 {
        "sending".to_string()
      } else {
        format!("#{}", c.id)
      };
      format!("{:<8} @{}: {}", id, c.author.username, c.text)
    })
    .collect();
  lines.push(page_footer(page));
  lines.join("\n")
}

fn render_users(page: &Page<UserSummary>) -> String {
  if page.items.is_empty() {
    return "no users".to_string();
  }
  let mut lines: Vec<String> = page
    .items
    .iter()
    .map(|u| {
      let mark = if u.is_followed_by_me { " (following)" } else { "" };
      format!("@{} {}{}", u.username, u.name, mark)
    })
    .collect();
  lines.push(page_footer(page));
  lines.join("\n")
}

fn render_profile(profile: &Profile) -> String {
  let relation = if profile.is_me {
    " (you)"
  } else if profile.is_followed_by_me {
    " (following)"
  } else {
    ""
  };
  let mut out = format!("{} @{}{}", profile.name, profile.username, relation);
  if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
    out.push('\n');
    out.push_str(bio);
  }
  out.push_str(&format!(
    "\n{} posts  {} followers  {} following",
    profile.counts.post, profile.counts.followers, profile.counts.following
  ));
  out
}

fn render_me(me: &Me) -> String {
  let profile = &me.profile;
  let mut out = format!("{} @{} <{}>", profile.name, profile.username, profile.email);
  if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
    out.push('\n');
    out.push_str(bio);
  }
  out.push_str(&format!(
    "\n{} posts  {} followers  {} following  {} likes",
    me.stats.posts, me.stats.followers, me.stats.following, me.stats.likes
  ));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::FakeApi;
  use crate::api::{Author, Pagination};
  use crate::sync::MutationSlot;

  fn post(id: u64, liked: bool) -> Post {
    Post {
      id,
      caption: Some("sunset".to_string()),
      image_url: None,
      created_at: None,
      author: Some(Author {
        id: 1,
        username: "ann".to_string(),
        name: "Ann".to_string(),
        avatar_url: None,
      }),
      like_count: 4,
      comment_count: 1,
      liked_by_me: liked,
      saved_by_me: false,
    }
  }

  #[test]
  fn test_render_posts_marks_liked() {
    let page = Page {
      items: vec![post(7, true)],
      pagination: Pagination {
        page: 1,
        limit: 10,
        total: 1,
        total_pages: 1,
      },
    };
    let out = render_posts(&page);
    assert!(out.contains("#7"));
    assert!(out.contains("♥"));
    assert!(out.ends_with("page 1/1 (1 total)"));
  }

  #[test]
  fn test_show_notes_offline_source() {
    let result = Ok(CacheResult::offline(Page::<Post>::empty(), None));
    assert_eq!(
      show(result, render_posts),
      "no posts\n(offline, showing cached data)"
    );
  }

  #[test]
  fn test_report_skips_notified_errors() {
    let api_err = MutationError::Api(crate::api::ApiError::EmptyInput { field: "Comment" });
    assert_eq!(report(&api_err), None);

    let slot = MutationSlot::new(crate::sync::ActionKind::Like, 7);
    assert_eq!(
      report(&MutationError::AlreadyPending(slot)),
      Some("like:7 already in progress".to_string())
    );
  }

  #[tokio::test]
  async fn test_like_command_applies_prediction_in_loop() {
    let api = Arc::new(FakeApi::new().with_post(7, 3, false));
    let mut shell = Shell::with_api(Config::default(), api.clone(), Some("t".to_string()));
    let page = shell.config.feed.page(1);
    shell.client.feed(page).await.unwrap();

    shell.handle_line("like 7");
    let state = shell.actions.like_state(7).unwrap().unwrap();
    assert!(state.is_pending());
    assert!(*state.visible());

    shell.handle_line("quit");
    assert!(shell.should_quit);
  }

  #[tokio::test]
  async fn test_register_command_signs_in() {
    let api = Arc::new(FakeApi::new());
    let mut shell = Shell::with_api(Config::default(), api.clone(), None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    shell.event_tx = tx;

    shell.handle_line("register cy cy@example.com 555 secret");
    match rx.recv().await {
      Some(Event::Output(text)) => assert_eq!(text, "registered and logged in as cy"),
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(shell.client.credentials().token().as_deref(), Some("token-cy"));
    assert_eq!(api.call_count("register"), 1);
  }

  #[test]
  fn test_render_me_lists_stats() {
    let me = Me {
      profile: crate::api::MeProfile {
        id: 1,
        name: "Ann".to_string(),
        username: "ann".to_string(),
        email: "ann@example.com".to_string(),
        phone: None,
        bio: None,
        avatar_url: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
      },
      stats: crate::api::MeStats {
        posts: 2,
        followers: 3,
        following: 1,
        likes: 9,
      },
    };
    assert_eq!(
      render_me(&me),
      "Ann @ann <ann@example.com>\n2 posts  3 followers  1 following  9 likes"
    );
  }
}
