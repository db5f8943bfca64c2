//! The caching worker: fetch interception, lifecycle, sync and push.
//!
//! A [`Worker`] is constructed once with an injected cache store, fetcher,
//! client hub and notifier, then driven entirely by [`WorkerEvent`]s. The
//! dispatch table in [`Worker::dispatch`] is the single place events meet
//! handlers.

mod classify;
mod lifecycle;
mod push;
mod strategy;
mod sync;

pub use classify::{classify, RouteClass};
pub use lifecycle::{ControlMessage, MessageAck, WorkerState};
pub use push::{LogNotifier, Notifier, NotificationAction, PushPayload};
pub use strategy::Strategies;
pub use sync::SyncTag;

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::{CacheStore, PartitionSet};
use crate::clients::ClientHub;
use crate::config::Config;
use crate::event::{EventHandler, WorkerEvent};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};

/// The offline caching worker.
pub struct Worker<S: CacheStore, F: Fetcher> {
  config: Config,
  origin: Url,
  partitions: PartitionSet,
  store: Arc<S>,
  fetcher: Arc<F>,
  strategies: Strategies<S, F>,
  clients: Arc<ClientHub>,
  notifier: Arc<dyn Notifier>,
  state: Mutex<WorkerState>,
  api_ttl: Duration,
  /// Cache key of the offline page inside the static partition
  offline_page_key: String,
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  pub fn new(
    config: Config,
    store: S,
    fetcher: F,
    clients: Arc<ClientHub>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    let origin = config.origin_url()?;
    let offline_page_url = origin
      .join(&config.offline_page)
      .map_err(|e| eyre!("Invalid offline page '{}': {}", config.offline_page, e))?;
    let offline_page_key = FetchRequest::get(offline_page_url).cache_key();

    let store = Arc::new(store);
    let fetcher = Arc::new(fetcher);
    let strategies = Strategies::new(Arc::clone(&store), Arc::clone(&fetcher));
    let partitions = PartitionSet::new(&config.cache_version);
    let api_ttl = Duration::seconds(config.api_ttl_secs as i64);

    Ok(Self {
      config,
      origin,
      partitions,
      store,
      fetcher,
      strategies,
      clients,
      notifier,
      state: Mutex::new(WorkerState::Installing),
      api_ttl,
      offline_page_key,
    })
  }

  /// Drive the worker from the event channel until it closes.
  pub async fn run(&self, mut events: EventHandler) {
    while let Some(event) = events.next().await {
      if let Err(err) = self.dispatch(event).await {
        error!(%err, "event handler failed");
      }
    }
  }

  /// Route an event to its handler. One arm per event kind.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<()> {
    match event {
      WorkerEvent::Fetch { request, respond } => {
        let response = match self.handle_fetch(request).await {
          Ok(response) => response,
          Err(err) => {
            warn!(%err, "fetch handling failed, serving offline response");
            FetchResponse::offline()
          }
        };
        // The requesting page may have gone away; that is not an error.
        let _ = respond.send(response);
        Ok(())
      }
      WorkerEvent::Message { message, reply } => self.handle_message(message, reply).await,
      WorkerEvent::Sync { tag } => self.handle_sync(&tag).await,
      WorkerEvent::Push { payload } => self.handle_push(&payload),
      WorkerEvent::NotificationClick { action, url } => {
        self.handle_notification_click(action.as_deref(), &url);
        Ok(())
      }
    }
  }

  /// Classify a request and run it through the matching strategy.
  async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
    let class = classify(&request, &self.config.api_prefix);
    let started = Instant::now();

    let response = match class {
      RouteClass::Passthrough => self.fetcher.fetch(request.clone()).await?,
      RouteClass::Api => {
        self
          .strategies
          .network_first(&request, &self.partitions.api(), self.api_ttl)
          .await?
      }
      RouteClass::Image => {
        self
          .strategies
          .cache_first(&request, &self.partitions.images())
          .await?
      }
      RouteClass::Navigation => {
        self
          .strategies
          .navigation(
            &request,
            &self.partitions.runtime(),
            &self.partitions.static_assets(),
            &self.offline_page_key,
          )
          .await?
      }
      RouteClass::Asset => {
        self
          .strategies
          .stale_while_revalidate(&request, &self.partitions.runtime())
          .await?
      }
    };

    debug!(
      url = %request.url,
      ?class,
      status = response.status,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "fetch handled"
    );

    Ok(response)
  }
}
