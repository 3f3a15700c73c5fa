//! Where notifications end up.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use url::Url;

use super::descriptor::NotificationDescriptor;

/// A boxed future returned by a sink
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Host-side display of notifications and client windows.
pub trait NotificationSink: Send + Sync {
  /// Display a notification; resolves once it is shown.
  fn show<'a>(&'a self, notification: &'a NotificationDescriptor) -> SinkFuture<'a>;

  /// Close the notification with the given tag.
  fn close(&self, tag: &str);

  /// Open a client window at `url`.
  fn open_window<'a>(&'a self, url: &'a Url) -> SinkFuture<'a>;
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SinkLine<'a> {
  Show {
    notification: &'a NotificationDescriptor,
  },
  Close {
    tag: &'a str,
  },
  OpenWindow {
    url: &'a str,
  },
}

/// Writes one JSON line per notification action to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
  fn emit(line: &SinkLine<'_>) -> Result<()> {
    let encoded =
      serde_json::to_string(line).map_err(|e| eyre!("Failed to encode notification: {}", e))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", encoded).map_err(|e| eyre!("Failed to write notification: {}", e))?;
    out
      .flush()
      .map_err(|e| eyre!("Failed to flush notification: {}", e))
  }
}

impl NotificationSink for ConsoleSink {
  fn show<'a>(&'a self, notification: &'a NotificationDescriptor) -> SinkFuture<'a> {
    Box::pin(async move { Self::emit(&SinkLine::Show { notification }) })
  }

  fn close(&self, tag: &str) {
    if let Err(e) = Self::emit(&SinkLine::Close { tag }) {
      tracing::warn!(error = %e, "Failed to close notification");
    }
  }

  fn open_window<'a>(&'a self, url: &'a Url) -> SinkFuture<'a> {
    Box::pin(async move { Self::emit(&SinkLine::OpenWindow { url: url.as_str() }) })
  }
}
