use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "feedsync=info";

/// Directory holding the log file: $XDG_DATA_HOME/feedsync, else ./.feedsync
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .map(|d| d.join("feedsync"))
    .unwrap_or_else(|| PathBuf::from(".feedsync"))
}

/// Send tracing output to a daily log file so stdout stays free for the
/// shell. Filter comes from FEEDSYNC_LOG, then RUST_LOG.
///
/// The returned guard flushes the writer on drop; keep it alive in `main`.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir();
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let filter = EnvFilter::try_from_env("FEEDSYNC_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let appender = tracing_appender::rolling::daily(&dir, "feedsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  Ok(guard)
}
