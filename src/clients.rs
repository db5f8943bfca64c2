//! Registry of connected pages.
//!
//! Stands in for the set of open browser windows the worker controls: each
//! client gets its own event channel, and the worker can broadcast to all of
//! them, focus one matching a URL, or ask for a new window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Events the worker pushes to connected pages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
  /// A new worker version has taken control.
  ControllerChange,
  /// A background sync for the given tag finished successfully.
  SyncCompleted { tag: String },
  /// This client should come to the foreground.
  Focus,
  /// No matching client existed; a new window should be opened at this URL.
  OpenWindow { url: String },
}

struct Client {
  id: u64,
  url: String,
  tx: mpsc::UnboundedSender<ClientEvent>,
}

/// Connected clients, shared between the worker and whatever hosts it.
#[derive(Default)]
pub struct ClientHub {
  clients: Mutex<Vec<Client>>,
  next_id: AtomicU64,
}

impl ClientHub {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a page at the given URL. Returns the client id and the channel
  /// it will receive events on.
  pub fn connect(&self, url: &str) -> (u64, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);

    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.push(Client {
      id,
      url: url.to_string(),
      tx,
    });
    debug!(id, url, "client connected");

    (id, rx)
  }

  pub fn disconnect(&self, id: u64) {
    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.retain(|c| c.id != id);
    debug!(id, "client disconnected");
  }

  /// Send an event to every connected client, pruning any that have gone
  /// away.
  pub fn broadcast(&self, event: ClientEvent) {
    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.retain(|c| c.tx.send(event.clone()).is_ok());
  }

  /// Try to focus an already-open client whose URL matches. Returns whether
  /// one was found.
  pub fn focus(&self, url: &str) -> bool {
    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.retain(|c| !c.tx.is_closed());

    for client in clients.iter() {
      if client.url.contains(url) && client.tx.send(ClientEvent::Focus).is_ok() {
        debug!(id = client.id, url, "focused existing client");
        return true;
      }
    }
    false
  }

  /// Ask connected clients to open a new window at the URL. With nobody
  /// connected this is a no-op beyond a log line.
  pub fn open(&self, url: &str) {
    let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    if clients.is_empty() {
      info!(url, "no clients connected to open window");
      return;
    }

    for client in clients.iter() {
      let _ = client.tx.send(ClientEvent::OpenWindow {
        url: url.to_string(),
      });
    }
  }

  pub fn len(&self) -> usize {
    let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_broadcast_reaches_all_clients() {
    let hub = ClientHub::new();
    let (_, mut rx1) = hub.connect("https://propertychain.example/");
    let (_, mut rx2) = hub.connect("https://propertychain.example/dashboard");

    hub.broadcast(ClientEvent::ControllerChange);

    assert_eq!(rx1.try_recv().unwrap(), ClientEvent::ControllerChange);
    assert_eq!(rx2.try_recv().unwrap(), ClientEvent::ControllerChange);
  }

  #[test]
  fn test_focus_matches_by_url_fragment() {
    let hub = ClientHub::new();
    let (_, mut rx) = hub.connect("https://propertychain.example/properties/42");

    assert!(hub.focus("/properties/42"));
    assert_eq!(rx.try_recv().unwrap(), ClientEvent::Focus);

    assert!(!hub.focus("/messages"));
  }

  #[test]
  fn test_open_broadcasts_window_request() {
    let hub = ClientHub::new();
    let (_, mut rx) = hub.connect("https://propertychain.example/");

    hub.open("/properties/7");
    assert_eq!(
      rx.try_recv().unwrap(),
      ClientEvent::OpenWindow {
        url: "/properties/7".to_string()
      }
    );
  }

  #[test]
  fn test_disconnect_removes_client() {
    let hub = ClientHub::new();
    let (id, _rx) = hub.connect("https://propertychain.example/");
    assert_eq!(hub.len(), 1);

    hub.disconnect(id);
    assert!(hub.is_empty());
  }

  #[test]
  fn test_dropped_receiver_is_pruned_on_broadcast() {
    let hub = ClientHub::new();
    let (_, rx) = hub.connect("https://propertychain.example/");
    drop(rx);

    hub.broadcast(ClientEvent::ControllerChange);
    assert!(hub.is_empty());
  }
}
