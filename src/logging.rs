//! Tracing setup: human-readable events on stderr plus a daily log file.

use color_eyre::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_ENV: &str = "KANBO_LOG";
const DEFAULT_FILTER: &str = "kanbo=info";
const FILE_FILTER: &str = "kanbo=debug";

/// Filter for the stderr layer. Falls back to the default on a bad directive.
fn stderr_filter(directive: Option<&str>) -> EnvFilter {
  directive
    .and_then(|d| EnvFilter::try_new(d).ok())
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// With a `log_dir`, debug-level events also go to `kanbo.log.<date>` there.
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let directive = std::env::var(LOG_ENV).ok();
  let stderr = tracing_subscriber::fmt::layer()
    .with_target(false)
    .with_writer(std::io::stderr)
    .with_filter(stderr_filter(directive.as_deref()));

  let Some(dir) = log_dir else {
    tracing_subscriber::registry().with(stderr).try_init()?;
    return Ok(None);
  };

  std::fs::create_dir_all(dir)?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "kanbo.log"));
  let file = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(writer)
    .with_filter(EnvFilter::new(FILE_FILTER));

  tracing_subscriber::registry()
    .with(stderr)
    .with(file)
    .try_init()?;
  Ok(Some(guard))
}
