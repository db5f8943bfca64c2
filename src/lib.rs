//! Offline-first caching worker for the PropertyChain web app.
//!
//! An event-driven worker that intercepts fetch requests and serves them
//! through named cache partitions using three strategies (network-first with
//! TTL, cache-first with background revalidation, stale-while-revalidate),
//! manages its own install/activate lifecycle, answers a small control
//! message protocol from connected pages, and handles background-sync and
//! push events.

pub mod cache;
pub mod clients;
pub mod config;
pub mod event;
pub mod fetch;
pub mod worker;
