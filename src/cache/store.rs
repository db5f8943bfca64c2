//! Cache store trait plus in-memory and SQLite implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use super::entry::CachedEntry;

/// Named, independently evictable key-value stores of cached responses.
///
/// Partitions are created implicitly on first write and only ever die whole:
/// either their name falls out of the current set at activation, or the page
/// asks for a full clear. There is no per-key locking; concurrent writers to
/// the same key are last-writer-wins.
pub trait CacheStore: Send + Sync + 'static {
  /// Look up an entry by request key.
  fn get(&self, partition: &str, key: &str) -> Result<Option<CachedEntry>>;

  /// Store or overwrite an entry.
  fn put(&self, partition: &str, key: &str, entry: &CachedEntry) -> Result<()>;

  /// Names of all partitions that currently hold at least one entry.
  fn list_partitions(&self) -> Result<Vec<String>>;

  /// Delete a whole partition. Returns whether anything was deleted.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Delete every partition.
  fn clear(&self) -> Result<()>;

  /// Read a metadata value (last-sync timestamps and the like).
  fn get_meta(&self, key: &str) -> Result<Option<String>>;

  /// Write a metadata value.
  fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store. The default for tests and for runs where persistence
/// across restarts is not wanted.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, HashMap<String, CachedEntry>>>,
  meta: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, partition: &str, key: &str) -> Result<Option<CachedEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.get(partition).and_then(|p| p.get(key)).cloned())
  }

  fn put(&self, partition: &str, key: &str, entry: &CachedEntry) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions
      .entry(partition.to_string())
      .or_default()
      .insert(key.to_string(), entry.clone());
    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.keys().cloned().collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.remove(partition).is_some())
  }

  fn clear(&self) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.clear();
    Ok(())
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let meta = self.meta.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(meta.get(key).cloned())
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let mut meta = self.meta.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    meta.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

/// SQLite-backed store for persistence across worker restarts.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &std::path::Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Cached responses, keyed by partition + hashed request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (partition, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
    ON cache_entries(partition);

-- Worker metadata (last-sync timestamps etc.)
CREATE TABLE IF NOT EXISTS worker_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SHA256 hash for stable, fixed-length request keys.
fn request_hash(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStore for SqliteStore {
  fn get(&self, partition: &str, key: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, fetched_at FROM cache_entries
         WHERE partition = ? AND request_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![partition, request_hash(key)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers_json, body, fetched_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;
        let fetched_at = parse_datetime(&fetched_at_str)?;
        Ok(Some(CachedEntry {
          status,
          headers,
          body,
          fetched_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &str, entry: &CachedEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers_json = serde_json::to_string(&entry.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (partition, request_hash, status, headers, body, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          partition,
          request_hash(key),
          entry.status,
          headers_json,
          entry.body,
          entry.fetched_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT partition FROM cache_entries")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute(
        "DELETE FROM cache_entries WHERE partition = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to delete partition: {}", e))?;

    Ok(deleted > 0)
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM worker_meta WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();

    Ok(value)
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO worker_meta (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store metadata: {}", e))?;

    Ok(())
  }
}

/// Parse an RFC 3339 timestamp from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
