//! The three caching strategies.
//!
//! Each strategy takes the request plus a target partition and decides how
//! cache and network interleave. Partitions are shared and unlocked, so two
//! concurrent requests for the same URL may both write; last writer wins.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheStore, CachedEntry};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};

/// Strategy engine shared by the fetch interceptor and the lifecycle
/// pre-warm paths.
pub struct Strategies<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
}

impl<S: CacheStore, F: Fetcher> Strategies<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self { store, fetcher }
  }

  /// Network-first with a TTL-bounded cache fallback.
  ///
  /// Fresh network responses are stamped and stored. When the network fails,
  /// a cached entry is served only while its age is within `ttl`; an expired
  /// entry is never served in place of a live error.
  pub async fn network_first(
    &self,
    request: &FetchRequest,
    partition: &str,
    ttl: Duration,
  ) -> Result<FetchResponse> {
    let key = request.cache_key();

    match self.fetcher.fetch(request.clone()).await {
      Ok(response) => {
        if response.ok() {
          self
            .store
            .put(partition, &key, &CachedEntry::from_response(&response))?;
        }
        Ok(response)
      }
      Err(err) => {
        debug!(url = %request.url, %err, "network failed, consulting cache");
        match self.store.get(partition, &key)? {
          Some(entry) if entry.is_fresh(ttl) => Ok(entry.into_response()),
          Some(_) => {
            warn!(url = %request.url, "cached entry expired, serving offline response");
            Ok(FetchResponse::offline())
          }
          None => Ok(FetchResponse::offline()),
        }
      }
    }
  }

  /// Network-first for navigations: no TTL, but a dedicated offline page.
  ///
  /// A failed navigation falls back to the last cached copy of the page,
  /// then to the offline page pre-warmed at install, then to the synthetic
  /// offline response.
  pub async fn navigation(
    &self,
    request: &FetchRequest,
    runtime_partition: &str,
    static_partition: &str,
    offline_page_key: &str,
  ) -> Result<FetchResponse> {
    let key = request.cache_key();

    match self.fetcher.fetch(request.clone()).await {
      Ok(response) => {
        if response.ok() {
          self
            .store
            .put(runtime_partition, &key, &CachedEntry::from_response(&response))?;
        }
        Ok(response)
      }
      Err(err) => {
        debug!(url = %request.url, %err, "navigation failed, falling back");
        if let Some(entry) = self.store.get(runtime_partition, &key)? {
          return Ok(entry.into_response());
        }
        if let Some(entry) = self.store.get(static_partition, offline_page_key)? {
          return Ok(entry.into_response());
        }
        Ok(FetchResponse::offline())
      }
    }
  }

  /// Cache-first with background revalidation.
  ///
  /// A hit is served immediately and a detached refresh keeps the entry
  /// current. A miss goes to the network; if that also fails, a placeholder
  /// image is served.
  pub async fn cache_first(
    &self,
    request: &FetchRequest,
    partition: &str,
  ) -> Result<FetchResponse> {
    let key = request.cache_key();

    if let Some(entry) = self.store.get(partition, &key)? {
      self.spawn_refresh(partition, request.clone());
      return Ok(entry.into_response());
    }

    match self.fetcher.fetch(request.clone()).await {
      Ok(response) => {
        if response.ok() {
          self
            .store
            .put(partition, &key, &CachedEntry::from_response(&response))?;
        }
        Ok(response)
      }
      Err(err) => {
        debug!(url = %request.url, %err, "image fetch failed, serving placeholder");
        Ok(FetchResponse::placeholder_image())
      }
    }
  }

  /// Stale-while-revalidate.
  ///
  /// The network fetch starts regardless; a cached entry is returned
  /// immediately when present, and the fetch overwrites the cache once it
  /// resolves. On a miss the response is whatever the fetch produces.
  pub async fn stale_while_revalidate(
    &self,
    request: &FetchRequest,
    partition: &str,
  ) -> Result<FetchResponse> {
    let key = request.cache_key();
    let refresh = self.spawn_refresh(partition, request.clone());

    match self.store.get(partition, &key)? {
      Some(entry) => Ok(entry.into_response()),
      None => refresh
        .await
        .map_err(|e| eyre!("Refresh task panicked: {}", e))?,
    }
  }

  /// Detached fetch-and-overwrite. Used both as the revalidation side of
  /// cache-first and as the network side of stale-while-revalidate.
  fn spawn_refresh(
    &self,
    partition: &str,
    request: FetchRequest,
  ) -> JoinHandle<Result<FetchResponse>> {
    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);
    let partition = partition.to_string();

    tokio::spawn(async move {
      let key = request.cache_key();
      match fetcher.fetch(request.clone()).await {
        Ok(response) => {
          if response.ok() {
            store.put(&partition, &key, &CachedEntry::from_response(&response))?;
          }
          Ok(response)
        }
        Err(err) => {
          debug!(url = %request.url, %err, "background refresh failed");
          Err(err)
        }
      }
    })
  }
}

impl<S: CacheStore, F: Fetcher> Clone for Strategies<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
    }
  }
}
