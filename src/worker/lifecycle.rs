//! Worker lifecycle: install, activate, and the page-facing message
//! protocol.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CachedEntry};
use crate::clients::ClientEvent;
use crate::fetch::{FetchRequest, Fetcher};

use super::Worker;

/// Lifecycle states, in order. `Redundant` is terminal: a replaced worker
/// never comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  Installed,
  Activating,
  Active,
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Active => "active",
      WorkerState::Redundant => "redundant",
    };
    write!(f, "{}", s)
  }
}

/// Control messages pages send to the worker.
///
/// Wire format is tagged JSON: `{"type": "SKIP_WAITING"}`,
/// `{"type": "CLEAR_CACHE"}`, `{"type": "CACHE_URLS", "urls": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  #[serde(rename = "CLEAR_CACHE")]
  ClearCache,
  #[serde(rename = "CACHE_URLS")]
  CacheUrls { urls: Vec<String> },
}

/// Acknowledgment sent back on the message reply port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageAck {
  pub success: bool,
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, next: WorkerState) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    info!(from = %*state, to = %next, "lifecycle transition");
    *state = next;
  }

  /// Pre-warm the static partition from the asset manifest.
  ///
  /// All-or-nothing: every asset is fetched before anything is written, and
  /// any failure aborts the install so a broken shell never activates.
  pub async fn install(&self) -> Result<()> {
    info!(assets = self.config.static_assets.len(), "installing");

    let fetches = self.config.static_assets.iter().map(|asset| async move {
      let url = self
        .origin
        .join(asset)
        .map_err(|e| eyre!("Invalid manifest asset '{}': {}", asset, e))?;
      let request = FetchRequest::get(url);

      let response = self
        .fetcher
        .fetch(request.clone())
        .await
        .map_err(|e| eyre!("Install failed fetching {}: {}", asset, e))?;
      if !response.ok() {
        return Err(eyre!(
          "Install failed: {} returned status {}",
          asset,
          response.status
        ));
      }

      Ok((request.cache_key(), CachedEntry::from_response(&response)))
    });

    let entries: Vec<(String, CachedEntry)> = try_join_all(fetches).await?;

    let partition = self.partitions.static_assets();
    for (key, entry) in &entries {
      self.store.put(&partition, key, entry)?;
    }

    self.set_state(WorkerState::Installed);
    Ok(())
  }

  /// Evict partitions from older versions and take control of all clients.
  pub async fn activate(&self) -> Result<()> {
    self.set_state(WorkerState::Activating);

    for name in self.store.list_partitions()? {
      if !self.partitions.is_current(&name) {
        info!(partition = %name, "evicting stale partition");
        self.store.delete_partition(&name)?;
      }
    }

    self.set_state(WorkerState::Active);
    self.clients.broadcast(ClientEvent::ControllerChange);
    Ok(())
  }

  /// Handle a control message, acknowledging on the reply port if one was
  /// provided.
  pub(crate) async fn handle_message(
    &self,
    message: ControlMessage,
    reply: Option<oneshot::Sender<MessageAck>>,
  ) -> Result<()> {
    let success = match message {
      ControlMessage::SkipWaiting => self.skip_waiting().await?,
      ControlMessage::ClearCache => {
        info!("clearing all cache partitions");
        self.store.clear()?;
        true
      }
      ControlMessage::CacheUrls { urls } => self.cache_urls(&urls).await,
    };

    if let Some(reply) = reply {
      // The page may have navigated away; nothing to do then.
      let _ = reply.send(MessageAck { success });
    }
    Ok(())
  }

  /// Activate immediately instead of waiting to be promoted.
  async fn skip_waiting(&self) -> Result<bool> {
    if self.state() == WorkerState::Installed {
      info!("skip-waiting: activating now");
      self.activate().await?;
    } else {
      debug!(state = %self.state(), "skip-waiting with no waiting worker");
    }
    Ok(true)
  }

  /// Pre-warm the runtime partition with a caller-supplied URL list.
  /// Returns false if any URL could not be cached.
  async fn cache_urls(&self, urls: &[String]) -> bool {
    let partition = self.partitions.runtime();
    let mut success = true;

    for raw in urls {
      let url = match self.origin.join(raw) {
        Ok(url) => url,
        Err(err) => {
          warn!(url = %raw, %err, "cache-urls: invalid url");
          success = false;
          continue;
        }
      };

      let request = FetchRequest::get(url);
      match self.fetcher.fetch(request.clone()).await {
        Ok(response) if response.ok() => {
          if let Err(err) = self.store.put(
            &partition,
            &request.cache_key(),
            &CachedEntry::from_response(&response),
          ) {
            warn!(url = %raw, %err, "cache-urls: store failed");
            success = false;
          }
        }
        Ok(response) => {
          warn!(url = %raw, status = response.status, "cache-urls: bad status");
          success = false;
        }
        Err(err) => {
          warn!(url = %raw, %err, "cache-urls: fetch failed");
          success = false;
        }
      }
    }

    success
  }
}
