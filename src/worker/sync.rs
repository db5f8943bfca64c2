//! Background sync: best-effort resynchronization per tag.
//!
//! The worker only makes one attempt per event; retry cadence belongs to the
//! tick task that keeps re-firing registered tags.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::clients::ClientEvent;
use crate::fetch::{FetchRequest, Fetcher};

use super::Worker;

/// Metadata key prefix for per-category last-sync timestamps.
const LAST_SYNC_PREFIX: &str = "last-sync:";

/// Known sync tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
  Properties,
  Messages,
}

impl SyncTag {
  pub fn parse(tag: &str) -> Option<Self> {
    match tag {
      "sync-properties" => Some(SyncTag::Properties),
      "sync-messages" => Some(SyncTag::Messages),
      _ => None,
    }
  }

  /// Resource category carried in the sync POST.
  pub fn category(&self) -> &'static str {
    match self {
      SyncTag::Properties => "properties",
      SyncTag::Messages => "messages",
    }
  }
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  /// Handle a sync event for the given tag.
  ///
  /// POSTs the last-known sync timestamp for the tag's category to the sync
  /// endpoint. Success advances the timestamp and notifies clients; failure
  /// is logged and left for the next tick.
  pub(crate) async fn handle_sync(&self, tag: &str) -> Result<()> {
    let Some(sync_tag) = SyncTag::parse(tag) else {
      warn!(tag, "ignoring unknown sync tag");
      return Ok(());
    };

    let meta_key = format!("{}{}", LAST_SYNC_PREFIX, sync_tag.category());
    let last_sync = self.store.get_meta(&meta_key)?;

    let url = self
      .origin
      .join(&self.config.sync_endpoint)
      .map_err(|e| eyre!("Invalid sync endpoint: {}", e))?;
    let payload = serde_json::json!({
      "category": sync_tag.category(),
      "last_sync": last_sync,
    });
    let request = FetchRequest::post_json(url, &payload)?;

    match self.fetcher.fetch(request).await {
      Ok(response) if response.ok() => {
        let now = Utc::now().to_rfc3339();
        self.store.set_meta(&meta_key, &now)?;
        self.clients.broadcast(ClientEvent::SyncCompleted {
          tag: tag.to_string(),
        });
        info!(tag, "sync completed");
      }
      Ok(response) => {
        warn!(tag, status = response.status, "sync endpoint rejected request");
      }
      Err(err) => {
        warn!(tag, %err, "sync failed, waiting for next tick");
      }
    }

    Ok(())
  }
}
