use serde::Deserialize;
use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::cache::ResponseSource;
use crate::intercept::Intercepted;
use crate::notify::{ClickOutcome, NotificationDescriptor};
use crate::sync::SyncOutcome;

/// Lifecycle events the agent reacts to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
  /// Populate the current cache bucket
  Install,
  /// Drop stale cache buckets
  Activate,
  /// Intercept a request
  Fetch {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Option<String>,
  },
  /// Connectivity restored
  Sync { tag: String },
  /// Push message, optionally carrying text
  Push {
    #[serde(default)]
    payload: Option<String>,
  },
  /// A notification (or one of its actions) was clicked
  #[serde(rename = "notificationclick")]
  NotificationClick {
    #[serde(default)]
    action: Option<String>,
  },
}

fn default_method() -> String {
  "GET".to_string()
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Activate => "activate",
      Event::Fetch { .. } => "fetch",
      Event::Sync { .. } => "sync",
      Event::Push { .. } => "push",
      Event::NotificationClick { .. } => "notificationclick",
    }
  }
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed { cached: usize },
  Activated { deleted: Vec<String> },
  Fetched(Intercepted),
  Synced(SyncOutcome),
  Pushed(NotificationDescriptor),
  Clicked(ClickOutcome),
}

impl fmt::Display for EventOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventOutcome::Installed { cached } => write!(f, "cached {} resources", cached),
      EventOutcome::Activated { deleted } if deleted.is_empty() => write!(f, "no stale caches"),
      EventOutcome::Activated { deleted } => write!(f, "deleted {}", deleted.join(", ")),
      EventOutcome::Fetched(intercepted) => {
        let source = match intercepted.source {
          ResponseSource::Cache => "cache",
          ResponseSource::Network => "network",
        };
        write!(
          f,
          "{} {} from {}",
          intercepted.response.status, intercepted.response.url, source
        )
      }
      EventOutcome::Synced(SyncOutcome::Ignored) => write!(f, "sync tag ignored"),
      EventOutcome::Synced(SyncOutcome::Sent {
        records,
        status,
        marked,
      }) => write!(
        f,
        "sent {} records (status {}, {} marked)",
        records, status, marked
      ),
      EventOutcome::Pushed(descriptor) => write!(f, "shown '{}'", descriptor.body),
      EventOutcome::Clicked(ClickOutcome::Closed) => write!(f, "closed"),
      EventOutcome::Clicked(ClickOutcome::OpenedWindow(url)) => write!(f, "opened {}", url),
    }
  }
}

/// Reads JSON-lines events from an async reader
pub struct EventReader {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReader {
  /// Spawn a task that parses one event per line.
  ///
  /// Blank lines are skipped; malformed lines are logged and skipped.
  pub fn new<R>(reader: R) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut lines = BufReader::new(reader).lines();
      let mut line_no = 0usize;
      loop {
        let line = match lines.next_line().await {
          Ok(Some(line)) => line,
          Ok(None) => break,
          Err(e) => {
            warn!(error = %e, "Failed to read event stream");
            break;
          }
        };
        line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
          continue;
        }

        match serde_json::from_str::<Event>(trimmed) {
          Ok(event) => {
            if tx.send(event).is_err() {
              break;
            }
          }
          Err(e) => warn!(line = line_no, error = %e, "Skipping malformed event"),
        }
      }
    });

    Self { rx }
  }

  pub fn stdin() -> Self {
    Self::new(tokio::io::stdin())
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
