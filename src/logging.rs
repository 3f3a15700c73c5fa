use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file prefix used with daily rotation
const LOG_FILE_PREFIX: &str = "fuelsw.log";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` controls the level (default `info`). Logs go to stderr, or to a
/// daily-rolled file when `log_dir` is set. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(log_dir: Option<&Path>) -> WorkerGuard {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let (writer, guard) = match log_dir {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
      dir,
      LOG_FILE_PREFIX,
    )),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(log_dir.is_none()),
    )
    .with(filter)
    .init();

  guard
}
