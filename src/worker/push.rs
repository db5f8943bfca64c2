//! Push notifications: typed payloads, display, click routing.

use color_eyre::Result;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::fetch::Fetcher;

use super::Worker;

/// A push payload after validation and defaulting.
///
/// The wire contract is a JSON object where every field is optional; a
/// missing or malformed payload degrades to the defaults rather than being
/// dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushPayload {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub require_interaction: bool,
  pub url: String,
  pub actions: Vec<NotificationAction>,
}

impl Default for PushPayload {
  fn default() -> Self {
    Self {
      title: "PropertyChain".to_string(),
      body: "You have a new notification".to_string(),
      tag: "propertychain".to_string(),
      require_interaction: false,
      url: "/".to_string(),
      actions: Vec::new(),
    }
  }
}

/// An action button on a notification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(default)]
  pub icon: Option<String>,
}

impl PushPayload {
  /// Parse a raw push payload, defaulting everything on absent or malformed
  /// input.
  pub fn parse(raw: &[u8]) -> Self {
    if raw.is_empty() {
      return Self::default();
    }

    match serde_json::from_slice(raw) {
      Ok(payload) => payload,
      Err(err) => {
        warn!(%err, "malformed push payload, using defaults");
        Self::default()
      }
    }
  }
}

/// Display layer for notifications. Production logs them; tests record them.
pub trait Notifier: Send + Sync {
  fn show(&self, payload: &PushPayload) -> Result<()>;
}

/// Notifier that writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn show(&self, payload: &PushPayload) -> Result<()> {
    info!(
      title = %payload.title,
      body = %payload.body,
      tag = %payload.tag,
      url = %payload.url,
      actions = payload.actions.len(),
      "notification"
    );
    Ok(())
  }
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  /// Display a notification for a push event.
  pub(crate) fn handle_push(&self, raw: &[u8]) -> Result<()> {
    let payload = PushPayload::parse(raw);
    self.notifier.show(&payload)
  }

  /// Route a notification interaction: `dismiss` closes only; anything else
  /// focuses a matching client or opens a new window.
  pub(crate) fn handle_notification_click(&self, action: Option<&str>, url: &str) {
    if action == Some("dismiss") {
      debug!(url, "notification dismissed");
      return;
    }

    if !self.clients.focus(url) {
      self.clients.open(url);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clients::ClientEvent;
  use crate::event::WorkerEvent;
  use crate::worker::testing::{test_worker, FakeFetcher};

  #[test]
  fn test_parse_full_payload() {
    let raw = br#"{
      "title": "New property listed",
      "body": "A duplex in Austin just opened for investment",
      "tag": "listing-42",
      "requireInteraction": true,
      "url": "/properties/42",
      "actions": [
        {"action": "view", "title": "View"},
        {"action": "dismiss", "title": "Dismiss", "icon": "/icons/x.png"}
      ]
    }"#;

    let payload = PushPayload::parse(raw);
    assert_eq!(payload.title, "New property listed");
    assert!(payload.require_interaction);
    assert_eq!(payload.url, "/properties/42");
    assert_eq!(payload.actions.len(), 2);
    assert_eq!(payload.actions[1].icon.as_deref(), Some("/icons/x.png"));
  }

  #[test]
  fn test_parse_partial_payload_fills_defaults() {
    let payload = PushPayload::parse(br#"{"title":"Test"}"#);
    assert_eq!(payload.title, "Test");
    assert_eq!(payload.body, "You have a new notification");
    assert_eq!(payload.url, "/");
    assert!(!payload.require_interaction);
    assert!(payload.actions.is_empty());
  }

  #[test]
  fn test_malformed_and_empty_payloads_default() {
    assert_eq!(PushPayload::parse(b"not json {{"), PushPayload::default());
    assert_eq!(PushPayload::parse(b""), PushPayload::default());
  }

  #[tokio::test]
  async fn test_push_event_displays_notification() {
    let t = test_worker(FakeFetcher::new());

    t.worker
      .dispatch(WorkerEvent::Push {
        payload: br#"{"title":"Test","body":"Hi","url":"/x"}"#.to_vec(),
      })
      .await
      .unwrap();

    let shown = t.notifier.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Test");
    assert_eq!(shown[0].body, "Hi");
    assert_eq!(shown[0].url, "/x");
  }

  #[tokio::test]
  async fn test_click_focuses_matching_client() {
    let t = test_worker(FakeFetcher::new());
    let (_, mut rx) = t.clients.connect("https://propertychain.example/x");

    t.worker
      .dispatch(WorkerEvent::NotificationClick {
        action: Some("view".to_string()),
        url: "/x".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(rx.try_recv().unwrap(), ClientEvent::Focus);
  }

  #[tokio::test]
  async fn test_click_opens_window_when_no_client_matches() {
    let t = test_worker(FakeFetcher::new());
    let (_, mut rx) = t.clients.connect("https://propertychain.example/other");

    t.worker
      .dispatch(WorkerEvent::NotificationClick {
        action: None,
        url: "/x".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(
      rx.try_recv().unwrap(),
      ClientEvent::OpenWindow {
        url: "/x".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_dismiss_closes_without_navigation() {
    let t = test_worker(FakeFetcher::new());
    let (_, mut rx) = t.clients.connect("https://propertychain.example/x");

    t.worker
      .dispatch(WorkerEvent::NotificationClick {
        action: Some("dismiss".to_string()),
        url: "/x".to_string(),
      })
      .await
      .unwrap();

    assert!(rx.try_recv().is_err());
  }
}
