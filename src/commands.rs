/// Shell commands, parsing and autocomplete logic

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "feed",
    aliases: &["f", "home"],
    usage: "feed [page]",
    description: "Show your feed",
  },
  Command {
    name: "explore",
    aliases: &["x", "all"],
    usage: "explore [page]",
    description: "Show everyone's posts",
  },
  Command {
    name: "posts",
    aliases: &[],
    usage: "posts <user> [page]",
    description: "Show a user's posts",
  },
  Command {
    name: "likes-of",
    aliases: &["liked"],
    usage: "likes-of <user> [page]",
    description: "Show posts a user liked",
  },
  Command {
    name: "like",
    aliases: &["l"],
    usage: "like <post>",
    description: "Like a post, or unlike it if already liked",
  },
  Command {
    name: "unlike",
    aliases: &["ul"],
    usage: "unlike <post>",
    description: "Remove your like from a post",
  },
  Command {
    name: "save",
    aliases: &["bookmark"],
    usage: "save <post>",
    description: "Save or unsave a post",
  },
  Command {
    name: "saved",
    aliases: &["bookmarks"],
    usage: "saved [page]",
    description: "Show saved posts",
  },
  Command {
    name: "comments",
    aliases: &["c"],
    usage: "comments <post> [page]",
    description: "Show comments on a post",
  },
  Command {
    name: "comment",
    aliases: &["reply"],
    usage: "comment <post> <text>",
    description: "Comment on a post",
  },
  Command {
    name: "uncomment",
    aliases: &["delcomment"],
    usage: "uncomment <post> <comment>",
    description: "Delete one of your comments",
  },
  Command {
    name: "likers",
    aliases: &["likes"],
    usage: "likers <post> [page]",
    description: "Show who liked a post",
  },
  Command {
    name: "follow",
    aliases: &[],
    usage: "follow <user>",
    description: "Follow a user",
  },
  Command {
    name: "unfollow",
    aliases: &[],
    usage: "unfollow <user>",
    description: "Stop following a user",
  },
  Command {
    name: "followers",
    aliases: &[],
    usage: "followers <user> [page]",
    description: "Show a user's followers",
  },
  Command {
    name: "following",
    aliases: &[],
    usage: "following <user> [page]",
    description: "Show who a user follows",
  },
  Command {
    name: "profile",
    aliases: &["p", "user"],
    usage: "profile <user>",
    description: "Show a user's profile",
  },
  Command {
    name: "me",
    aliases: &["whoami"],
    usage: "me",
    description: "Show your own profile and stats",
  },
  Command {
    name: "search",
    aliases: &["s", "find"],
    usage: "search <query> [page]",
    description: "Search users",
  },
  Command {
    name: "rm",
    aliases: &["delete"],
    usage: "rm <post>",
    description: "Delete one of your posts",
  },
  Command {
    name: "pending",
    aliases: &["jobs"],
    usage: "pending",
    description: "List mutations waiting for the server",
  },
  Command {
    name: "login",
    aliases: &["signin"],
    usage: "login <email> <password>",
    description: "Log in",
  },
  Command {
    name: "register",
    aliases: &["signup"],
    usage: "register <username> <email> <phone> <password> [name]",
    description: "Create an account",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit feedsync",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Exact name or alias lookup
pub fn resolve(word: &str) -> Option<&'static Command> {
  let word = word.to_lowercase();
  COMMANDS
    .iter()
    .find(|c| c.name == word || c.aliases.contains(&word.as_str()))
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
  Feed { page: u32 },
  Explore { page: u32 },
  UserPosts { user: String, page: u32 },
  UserLikes { user: String, page: u32 },
  Like { post: u64 },
  Unlike { post: u64 },
  Save { post: u64 },
  Saved { page: u32 },
  Comments { post: u64, page: u32 },
  Comment { post: u64, text: String },
  Uncomment { post: u64, comment: i64 },
  Likers { post: u64, page: u32 },
  Follow { user: String },
  Unfollow { user: String },
  Followers { user: String, page: u32 },
  Following { user: String, page: u32 },
  Profile { user: String },
  Me,
  Search { query: String, page: u32 },
  Remove { post: u64 },
  Pending,
  Login { email: String, password: String },
  Register {
    username: String,
    email: String,
    phone: String,
    password: String,
    name: String,
  },
  Help,
  Quit,
}

/// Why a line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  Empty,
  /// Unknown word, with the closest command names
  Unknown {
    word: String,
    suggestions: Vec<&'static str>,
  },
  /// Known command with bad arguments
  Usage(&'static Command),
}

pub fn parse(line: &str) -> Result<Request, ParseError> {
  let line = line.trim();
  let (word, rest) = match line.split_once(char::is_whitespace) {
    Some((word, rest)) => (word, rest.trim()),
    None => (line, ""),
  };
  if word.is_empty() {
    return Err(ParseError::Empty);
  }

  let cmd = resolve(word).ok_or_else(|| ParseError::Unknown {
    word: word.to_string(),
    suggestions: get_suggestions(word).iter().take(3).map(|c| c.name).collect(),
  })?;
  let args: Vec<&str> = rest.split_whitespace().collect();
  let usage = || ParseError::Usage(cmd);

  let post = |i: usize| args.get(i).and_then(|a| a.trim_start_matches('#').parse::<u64>().ok());
  let page = |i: usize| match args.get(i) {
    Some(a) => a.parse::<u32>().ok().filter(|p| *p > 0),
    None => Some(1),
  };
  let user = |i: usize| args.get(i).map(|a| a.trim_start_matches('@').to_string());

  let request = match cmd.name {
    "feed" => Request::Feed { page: page(0).ok_or_else(usage)? },
    "explore" => Request::Explore { page: page(0).ok_or_else(usage)? },
    "posts" => Request::UserPosts {
      user: user(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "likes-of" => Request::UserLikes {
      user: user(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "like" => Request::Like { post: post(0).ok_or_else(usage)? },
    "unlike" => Request::Unlike { post: post(0).ok_or_else(usage)? },
    "save" => Request::Save { post: post(0).ok_or_else(usage)? },
    "saved" => Request::Saved { page: page(0).ok_or_else(usage)? },
    "comments" => Request::Comments {
      post: post(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "comment" => {
      let post = post(0).ok_or_else(usage)?;
      // Text keeps its inner spacing
      let text = rest
        .split_once(char::is_whitespace)
        .map(|(_, text)| text.trim().to_string())
        .unwrap_or_default();
      Request::Comment { post, text }
    }
    "uncomment" => Request::Uncomment {
      post: post(0).ok_or_else(usage)?,
      comment: args
        .get(1)
        .and_then(|a| a.parse::<i64>().ok())
        .ok_or_else(usage)?,
    },
    "likers" => Request::Likers {
      post: post(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "follow" => Request::Follow { user: user(0).ok_or_else(usage)? },
    "unfollow" => Request::Unfollow { user: user(0).ok_or_else(usage)? },
    "followers" => Request::Followers {
      user: user(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "following" => Request::Following {
      user: user(0).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "profile" => Request::Profile { user: user(0).ok_or_else(usage)? },
    "me" => Request::Me,
    "search" => Request::Search {
      query: args.first().map(|a| a.to_string()).ok_or_else(usage)?,
      page: page(1).ok_or_else(usage)?,
    },
    "rm" => Request::Remove { post: post(0).ok_or_else(usage)? },
    "pending" => Request::Pending,
    "login" => match args.as_slice() {
      [email, password] => Request::Login {
        email: email.to_string(),
        password: password.to_string(),
      },
      _ => return Err(usage()),
    },
    "register" => match args.as_slice() {
      [username, email, phone, password, name @ ..] => Request::Register {
        username: username.trim_start_matches('@').to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        password: password.to_string(),
        name: name.join(" "),
      },
      _ => return Err(usage()),
    },
    "help" => Request::Help,
    "quit" => Request::Quit,
    _ => return Err(usage()),
  };
  Ok(request)
}
