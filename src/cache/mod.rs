//! Persistent request/response cache store.
//!
//! This module mirrors the host-managed Cache Storage a browser gives a
//! service worker:
//! - Named caches, remembered in creation order
//! - Entries keyed by request method + URL, storing the full response
//! - Batch writes that land completely or not at all
//! - Lookups scoped to one cache or across every cache

mod key;
mod storage;

pub use key::request_key;
pub use storage::{CacheStorage, SqliteStorage};
#[cfg(test)]
pub use storage::CachedResponse;
