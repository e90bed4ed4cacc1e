//! Tracing setup. Logs go to a daily rolling file so they never mix with the
//! progress output, unless stderr is requested.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const CRATE_TARGET: &str = "portal_progress";

/// Filter used when `RUST_LOG` is not set.
fn default_filter(debug: bool) -> EnvFilter {
  let level = if debug { "debug" } else { "info" };
  EnvFilter::new(format!("warn,{}={}", CRATE_TARGET, level))
}

fn env_filter(debug: bool) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the program exits.
pub fn init(debug: bool, to_stderr: bool) -> Result<Option<WorkerGuard>> {
  if to_stderr {
    tracing_subscriber::registry()
      .with(
        fmt::layer()
          .with_writer(std::io::stderr)
          .with_target(false)
          .with_filter(env_filter(debug)),
      )
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  }

  let log_dir = log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "portal-progress.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter(debug)),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::debug!(log_dir = %log_dir.display(), "logging initialized");
  Ok(Some(guard))
}

fn log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(data_dir.join("portal-progress").join("logs"))
}
