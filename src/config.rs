use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the worker serves, e.g. "https://propertychain.example"
  pub origin: String,

  /// Path prefix routed to the network-first API strategy
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,

  /// Version tag baked into partition names; bump to evict everything on
  /// the next activation
  #[serde(default = "default_cache_version")]
  pub cache_version: String,

  /// TTL for cached API responses, in seconds
  #[serde(default = "default_api_ttl_secs")]
  pub api_ttl_secs: u64,

  /// How often registered sync tags re-fire, in seconds
  #[serde(default = "default_sync_interval_secs")]
  pub sync_interval_secs: u64,

  /// Page served when a navigation fails offline
  #[serde(default = "default_offline_page")]
  pub offline_page: String,

  /// Endpoint background syncs POST to
  #[serde(default = "default_sync_endpoint")]
  pub sync_endpoint: String,

  /// App shell pre-warmed at install time; install fails if any of these
  /// cannot be fetched
  #[serde(default = "default_static_assets")]
  pub static_assets: Vec<String>,

  /// Sync tags the tick task keeps re-firing
  #[serde(default = "default_sync_tags")]
  pub sync_tags: Vec<String>,
}

fn default_api_prefix() -> String {
  "/api/".to_string()
}

fn default_cache_version() -> String {
  "v1".to_string()
}

fn default_api_ttl_secs() -> u64 {
  300
}

fn default_sync_interval_secs() -> u64 {
  900
}

fn default_offline_page() -> String {
  "/offline".to_string()
}

fn default_sync_endpoint() -> String {
  "/api/sync".to_string()
}

fn default_static_assets() -> Vec<String> {
  [
    "/",
    "/offline",
    "/manifest.json",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

fn default_sync_tags() -> Vec<String> {
  vec!["sync-properties".to_string(), "sync-messages".to_string()]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offcache/config.yaml\n\
                 At minimum it must set `origin`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.origin_url()?;

    Ok(config)
  }

  /// The configured origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve an app path against the origin.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }
}
