use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::descriptor::NotificationDescriptor;
use super::sink::NotificationSink;
use crate::config::NotificationConfig;

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// The notification was closed and nothing else happened
  Closed,
  /// The notification was closed and a window opened at this URL
  OpenedWindow(Url),
}

/// Turns push and click events into sink calls.
pub struct NotificationRelay {
  sink: Arc<dyn NotificationSink>,
  config: NotificationConfig,
  origin: Url,
}

impl NotificationRelay {
  pub fn new(sink: Arc<dyn NotificationSink>, config: NotificationConfig, origin: Url) -> Self {
    Self {
      sink,
      config,
      origin,
    }
  }

  /// Show the notification for a push and wait until it is displayed.
  pub async fn on_push(&self, payload: Option<&str>) -> Result<NotificationDescriptor> {
    let descriptor = NotificationDescriptor::for_push(&self.config, payload, Utc::now());
    self.sink.show(&descriptor).await?;
    Ok(descriptor)
  }

  /// Close the clicked notification; the open action also opens a window.
  pub async fn on_click(&self, action: Option<&str>) -> Result<ClickOutcome> {
    self.sink.close(&self.config.tag);

    if action != Some(self.config.open_action.action.as_str()) {
      debug!(action = ?action, "Notification closed without opening a window");
      return Ok(ClickOutcome::Closed);
    }

    let url = self
      .origin
      .join(&self.config.open_url)
      .map_err(|e| eyre!("Invalid window URL '{}': {}", self.config.open_url, e))?;
    self.sink.open_window(&url).await?;

    Ok(ClickOutcome::OpenedWindow(url))
  }
}
