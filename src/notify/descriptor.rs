use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ActionConfig, NotificationConfig};

/// Auxiliary data attached to every push notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

impl From<&ActionConfig> for NotificationAction {
  fn from(config: &ActionConfig) -> Self {
    Self {
      action: config.action.clone(),
      title: config.title.clone(),
      icon: config.icon.clone(),
    }
  }
}

/// A notification to display. Built per push event and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationDescriptor {
  pub title: String,
  pub tag: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl NotificationDescriptor {
  /// Build the descriptor for a push. The payload text becomes the body
  /// verbatim; without one the configured fallback is used.
  pub fn for_push(config: &NotificationConfig, payload: Option<&str>, now: DateTime<Utc>) -> Self {
    Self {
      title: config.title.clone(),
      tag: config.tag.clone(),
      body: payload
        .map(String::from)
        .unwrap_or_else(|| config.fallback_body.clone()),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: now.timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        NotificationAction::from(&config.open_action),
        NotificationAction::from(&config.dismiss_action),
      ],
    }
  }
}
