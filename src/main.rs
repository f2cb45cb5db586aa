use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use feedsync::config::{self, Config};
use feedsync::{logging, shell};

#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(about = "A social-media client with an optimistic local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./feedsync.yaml or $XDG_CONFIG_HOME/feedsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Bearer token (default: FEEDSYNC_TOKEN)
  #[arg(short, long)]
  token: Option<String>,

  /// API base URL, overriding the config file
  #[arg(long)]
  base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.api = config::ApiConfig {
      base_url,
      ..config.api
    };
  }

  let _log_guard = logging::init()?;
  tracing::info!(base_url = %config.api.base_url, "starting");

  let token = args.token.or_else(Config::token_from_env);
  let mut shell = shell::Shell::new(config, token)?;
  shell.run().await?;

  Ok(())
}
