//! Worker events and the channel plumbing that delivers them.
//!
//! Everything the worker reacts to arrives as a [`WorkerEvent`] on a single
//! mpsc channel, mirroring a service worker's event loop. Pages hold a
//! [`WorkerHandle`] to submit events; a background tick task re-dispatches
//! registered sync tags the way the platform's background-sync retry would.

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::fetch::{FetchRequest, FetchResponse};
use crate::worker::{ControlMessage, MessageAck};

/// Events dispatched to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  /// An intercepted network request; the response goes back on `respond`.
  Fetch {
    request: FetchRequest,
    respond: oneshot::Sender<FetchResponse>,
  },
  /// A control message from a page, with an optional reply port.
  Message {
    message: ControlMessage,
    reply: Option<oneshot::Sender<MessageAck>>,
  },
  /// A background sync firing for the given tag.
  Sync { tag: String },
  /// A push event carrying a raw (possibly malformed) JSON payload.
  Push { payload: Vec<u8> },
  /// The user interacted with a displayed notification.
  NotificationClick { action: Option<String>, url: String },
}

/// Cloneable sender half used by pages to reach the worker.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  pub fn send(&self, event: WorkerEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Worker event loop has shut down"))
  }

  /// Submit a fetch and wait for the routed response.
  pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
    let (respond, rx) = oneshot::channel();
    self.send(WorkerEvent::Fetch { request, respond })?;
    rx.await
      .map_err(|_| eyre!("Worker dropped the fetch response"))
  }

  /// Send a control message and wait for its acknowledgment.
  pub async fn post_message(&self, message: ControlMessage) -> Result<MessageAck> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Message {
      message,
      reply: Some(reply),
    })?;
    rx.await
      .map_err(|_| eyre!("Worker dropped the message reply"))
  }
}

/// Receiving side of the worker event loop.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl EventHandler {
  /// Create the handle/handler pair.
  pub fn new() -> (WorkerHandle, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkerHandle { tx }, Self { rx })
  }

  /// Spawn a tick task that periodically re-fires the registered sync tags.
  ///
  /// This plays the role of the platform's background-sync scheduler: the
  /// worker itself never retries a failed sync, it just waits for the next
  /// tick.
  pub fn spawn_sync_tick(handle: WorkerHandle, period: Duration, tags: Vec<String>) {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      // The first tick fires immediately; skip it so syncs start one period in.
      interval.tick().await;

      loop {
        interval.tick().await;
        for tag in &tags {
          debug!(tag, "sync tick");
          if handle.send(WorkerEvent::Sync { tag: tag.clone() }).is_err() {
            return;
          }
        }
      }
    });
  }

  /// Receive the next event.
  pub async fn next(&mut self) -> Option<WorkerEvent> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_handle_delivers_events_in_order() {
    let (handle, mut events) = EventHandler::new();

    handle
      .send(WorkerEvent::Sync {
        tag: "sync-properties".to_string(),
      })
      .unwrap();
    handle
      .send(WorkerEvent::Push {
        payload: b"{}".to_vec(),
      })
      .unwrap();

    assert!(matches!(
      events.next().await,
      Some(WorkerEvent::Sync { tag }) if tag == "sync-properties"
    ));
    assert!(matches!(events.next().await, Some(WorkerEvent::Push { .. })));
  }

  #[tokio::test]
  async fn test_sync_tick_emits_registered_tags() {
    let (handle, mut events) = EventHandler::new();

    EventHandler::spawn_sync_tick(
      handle,
      Duration::from_millis(10),
      vec!["sync-properties".to_string(), "sync-messages".to_string()],
    );

    let first = events.next().await;
    let second = events.next().await;

    assert!(matches!(first, Some(WorkerEvent::Sync { tag }) if tag == "sync-properties"));
    assert!(matches!(second, Some(WorkerEvent::Sync { tag }) if tag == "sync-messages"));
  }

  #[tokio::test]
  async fn test_send_fails_after_handler_dropped() {
    let (handle, events) = EventHandler::new();
    drop(events);

    assert!(handle
      .send(WorkerEvent::Sync {
        tag: "sync-properties".to_string(),
      })
      .is_err());
  }
}
