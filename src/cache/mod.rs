//! Named cache partitions for offline support.
//!
//! This module provides the storage side of the worker:
//! - Partitions: named, independently evictable response stores
//! - Entries: stored responses stamped with a fetch timestamp for TTL checks
//! - Two backends: in-memory and SQLite (persistent across restarts)

mod entry;
mod store;

pub use entry::{CachedEntry, PartitionSet, FETCHED_ON_HEADER};
pub use store::{CacheStore, MemoryStore, SqliteStore};
