use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use offcache::cache::{CacheStore, MemoryStore, SqliteStore};
use offcache::clients::ClientHub;
use offcache::config::Config;
use offcache::event::EventHandler;
use offcache::fetch::HttpFetcher;
use offcache::worker::{LogNotifier, Notifier, Worker};

#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(about = "Offline-first caching worker for the PropertyChain web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep the cache in memory instead of the SQLite store
  #[arg(long)]
  memory: bool,

  /// Directory for rolling log files (logs to stderr if unset)
  #[arg(long)]
  log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.log_dir.as_deref());

  let config = Config::load(args.config.as_deref())?;

  if args.memory {
    run(config, MemoryStore::new()).await
  } else {
    run(config, SqliteStore::open()?).await
  }
}

async fn run<S: CacheStore>(config: Config, store: S) -> Result<()> {
  let sync_period = Duration::from_secs(config.sync_interval_secs);
  let sync_tags = config.sync_tags.clone();

  let fetcher = HttpFetcher::new()?;
  let clients = Arc::new(ClientHub::new());
  let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
  let worker = Worker::new(config, store, fetcher, clients, notifier)?;

  let (handle, events) = EventHandler::new();
  EventHandler::spawn_sync_tick(handle, sync_period, sync_tags);

  worker.install().await?;
  worker.activate().await?;
  info!("worker active");

  tokio::select! {
    _ = worker.run(events) => {}
    _ = tokio::signal::ctrl_c() => info!("shutting down"),
  }

  Ok(())
}

/// Set up the tracing subscriber, optionally writing to a daily-rolled file.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "offcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}
