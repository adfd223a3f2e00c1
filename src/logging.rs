//! Structured logging to a file in the data directory.
//!
//! The terminal UI owns stdout, so log lines never go to the terminal.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "myblog.log";
const DEFAULT_FILTER: &str = "myblog=info";

/// Filter from `RUST_LOG`, falling back to `myblog=info`.
fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber writing to `dir/myblog.log`.
///
/// Keep the returned guard alive until exit, dropping it flushes the writer.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_filter_parses() {
    let filter = EnvFilter::new(DEFAULT_FILTER);
    assert_eq!(filter.to_string(), DEFAULT_FILTER);
  }
}
