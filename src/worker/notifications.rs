//! Push messages and the notifications they produce.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

use crate::config::NotificationConfig;

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub url: Option<String>,
}

/// Metadata attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Page to show when the notification is clicked
  pub url: String,
}

/// A notification as displayed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub timestamp: DateTime<Utc>,
}

impl Notification {
  /// Build a notification from a push payload, filling absent fields
  /// from the configured defaults. The default target is the site root.
  pub fn from_payload(payload: PushPayload, defaults: &NotificationConfig) -> Self {
    Self {
      title: payload.title.unwrap_or_else(|| defaults.title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.body.clone()),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      vibrate: defaults.vibrate.clone(),
      data: NotificationData {
        url: payload.url.unwrap_or_else(|| "/".to_string()),
      },
      timestamp: Utc::now(),
    }
  }
}

/// Where notifications are displayed.
pub trait NotificationSink: Send + Sync {
  fn show(&self, notification: &Notification) -> Result<()>;

  fn close(&self, notification: &Notification) -> Result<()>;
}

/// Prints notifications to stdout.
pub struct TerminalSink;

impl NotificationSink for TerminalSink {
  fn show(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, url = %notification.data.url, "showing notification");
    println!("[notification] {}", notification.title);
    println!("   {}", notification.body);
    println!("   -> {}", notification.data.url);
    Ok(())
  }

  fn close(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "closing notification");
    Ok(())
  }
}

/// Keeps displayed notifications in memory.
#[derive(Debug, Default)]
pub struct NotificationTray {
  shown: Mutex<Vec<Notification>>,
}

impl NotificationTray {
  pub fn new() -> Self {
    Self::default()
  }

  /// Notifications currently displayed.
  #[cfg(test)]
  pub fn shown(&self) -> Vec<Notification> {
    self.shown.lock().map(|s| s.clone()).unwrap_or_default()
  }
}

impl NotificationSink for NotificationTray {
  fn show(&self, notification: &Notification) -> Result<()> {
    if let Ok(mut shown) = self.shown.lock() {
      shown.push(notification.clone());
    }
    Ok(())
  }

  fn close(&self, notification: &Notification) -> Result<()> {
    if let Ok(mut shown) = self.shown.lock() {
      shown.retain(|n| n != notification);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_payload_fields_override_defaults() {
    let payload: PushPayload = serde_json::from_str(
      r#"{"title":"New post","body":"Rust lifetimes explained","url":"/post/12/"}"#,
    )
    .unwrap();
    let n = Notification::from_payload(payload, &NotificationConfig::default());

    assert_eq!(n.title, "New post");
    assert_eq!(n.body, "Rust lifetimes explained");
    assert_eq!(n.data.url, "/post/12/");
    assert_eq!(n.icon, "/static/images/favicon.ico");
  }

  #[test]
  fn test_empty_payload_uses_defaults() {
    let payload: PushPayload = serde_json::from_str("{}").unwrap();
    let defaults = NotificationConfig::default();
    let n = Notification::from_payload(payload, &defaults);

    assert_eq!(n.title, defaults.title);
    assert_eq!(n.body, defaults.body);
    assert_eq!(n.data.url, "/");
    assert_eq!(n.vibrate, vec![200, 100, 200]);
  }

  #[test]
  fn test_tray_close_removes_notification() {
    let tray = NotificationTray::new();
    let n = Notification::from_payload(PushPayload::default(), &NotificationConfig::default());

    tray.show(&n).unwrap();
    assert_eq!(tray.shown().len(), 1);
    tray.close(&n).unwrap();
    assert!(tray.shown().is_empty());
  }
}
