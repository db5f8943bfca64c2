//! Cached entries and the reserved partition name set.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchResponse;

/// Header injected into responses served from cache, carrying the time the
/// entry was originally fetched.
pub const FETCHED_ON_HEADER: &str = "x-offcache-fetched-on";

/// Partition name prefix shared by all current partitions.
const PARTITION_PREFIX: &str = "propertychain";

/// A stored response plus the timestamp it was fetched at.
///
/// Entries are overwrite-only: there is no partial update, and an entry dies
/// with its partition or an explicit clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub fetched_at: DateTime<Utc>,
}

impl CachedEntry {
  /// Snapshot a response, stamping it with the current time.
  pub fn from_response(response: &FetchResponse) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      fetched_at: Utc::now(),
    }
  }

  pub fn age(&self) -> Duration {
    Utc::now() - self.fetched_at
  }

  /// Whether the entry is still within the given TTL.
  pub fn is_fresh(&self, ttl: Duration) -> bool {
    self.age() <= ttl
  }

  /// Reconstruct a servable response, with the fetch timestamp exposed as a
  /// header so callers can tell cached data apart from live data.
  pub fn into_response(self) -> FetchResponse {
    let mut headers = self.headers;
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(FETCHED_ON_HEADER));
    headers.push((FETCHED_ON_HEADER.to_string(), self.fetched_at.to_rfc3339()));

    FetchResponse {
      status: self.status,
      headers,
      body: self.body,
    }
  }
}

/// The four reserved partition names for a given cache version.
///
/// After activation, exactly these partitions are current; anything else is
/// evicted whole.
#[derive(Debug, Clone)]
pub struct PartitionSet {
  version: String,
}

impl PartitionSet {
  pub fn new(version: &str) -> Self {
    Self {
      version: version.to_string(),
    }
  }

  /// App shell pre-warmed at install time.
  pub fn static_assets(&self) -> String {
    format!("{}-static-{}", PARTITION_PREFIX, self.version)
  }

  /// Everything picked up at runtime (navigations, scripts, styles).
  pub fn runtime(&self) -> String {
    format!("{}-runtime-{}", PARTITION_PREFIX, self.version)
  }

  pub fn images(&self) -> String {
    format!("{}-images-{}", PARTITION_PREFIX, self.version)
  }

  pub fn api(&self) -> String {
    format!("{}-api-{}", PARTITION_PREFIX, self.version)
  }

  /// All current partition names.
  pub fn all(&self) -> [String; 4] {
    [
      self.static_assets(),
      self.runtime(),
      self.images(),
      self.api(),
    ]
  }

  /// Whether a partition name belongs to the current version set.
  pub fn is_current(&self, name: &str) -> bool {
    self.all().iter().any(|n| n == name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_staleness() {
    let mut entry = CachedEntry::from_response(&FetchResponse::new(200, b"hi".to_vec()));
    assert!(entry.is_fresh(Duration::minutes(5)));

    entry.fetched_at = Utc::now() - Duration::minutes(10);
    assert!(!entry.is_fresh(Duration::minutes(5)));
  }

  #[test]
  fn test_into_response_injects_fetch_timestamp() {
    let entry = CachedEntry::from_response(&FetchResponse::new(200, b"body".to_vec()));
    let fetched_at = entry.fetched_at;

    let resp = entry.into_response();
    assert_eq!(resp.header(FETCHED_ON_HEADER), Some(fetched_at.to_rfc3339().as_str()));
    assert_eq!(resp.body, b"body");
  }

  #[test]
  fn test_partition_set_names() {
    let partitions = PartitionSet::new("v1");
    assert_eq!(partitions.static_assets(), "propertychain-static-v1");
    assert_eq!(partitions.runtime(), "propertychain-runtime-v1");
    assert_eq!(partitions.images(), "propertychain-images-v1");
    assert_eq!(partitions.api(), "propertychain-api-v1");

    assert!(partitions.is_current("propertychain-api-v1"));
    assert!(!partitions.is_current("propertychain-api-v0"));
    assert!(!partitions.is_current("v-old-static"));
  }
}
