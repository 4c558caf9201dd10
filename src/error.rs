//! Error types for the worker, its cache store and its network client.

use thiserror::Error;

use crate::worker::EventKind;

/// Errors produced while handling lifecycle and fetch events.
#[derive(Error, Debug)]
pub enum Error {
  /// The SQLite cache store failed.
  #[error("cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// The request never produced a response (offline, DNS, TLS, ...).
  #[error("network error fetching {url}: {source}")]
  Network {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The HTTP client could not be constructed.
  #[error("failed to build HTTP client: {0}")]
  HttpClient(#[source] reqwest::Error),

  /// A response arrived but its status is not in the 2xx range.
  #[error("request for {url} returned status {status}")]
  BadStatus { url: String, status: u16 },

  /// A resource locator could not be resolved to an absolute URL.
  #[error("invalid resource locator '{locator}': {source}")]
  InvalidUrl {
    locator: String,
    #[source]
    source: url::ParseError,
  },

  /// Only http and https requests can be cached.
  #[error("unsupported URL scheme for {0}")]
  UnsupportedScheme(String),

  /// The operation is not valid in the current state.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// Pre-caching failed; nothing from the batch was stored.
  #[error("install failed for cache '{cache}': {source}")]
  InstallFailed {
    cache: String,
    #[source]
    source: Box<Error>,
  },

  /// No handler is registered for the dispatched event.
  #[error("no handler registered for {0} events")]
  NoHandler(EventKind),

  /// A stored response could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The storage mutex was poisoned by a panicking holder.
  #[error("lock poisoned: {0}")]
  LockPoisoned(String),
}

/// A specialized `Result` type for worker operations.
pub type Result<T> = std::result::Result<T, Error>;
