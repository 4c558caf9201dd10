//! Cache-first fetch handler.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::cache::CacheStorage;
use crate::config::{LookupScope, WorkerConfig};
use crate::error::Result;
use crate::http::{Request, Response};
use crate::net::Fetch;

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored response from a cache
  Cache,
  /// Live network response, not stored
  Network,
}

/// Result of resolving a fetch, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct FetchResult {
  pub response: Response,
  pub source: ResponseSource,
  /// Name of the cache that answered (if from cache)
  pub cache_name: Option<String>,
  /// When the entry was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResult {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cache_name: None,
      cached_at: None,
    }
  }

  pub fn from_cache(response: Response, cache_name: String, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
      cache_name: Some(cache_name),
      cached_at: Some(cached_at),
    }
  }
}

/// Answers intercepted requests from cache, falling back to the network.
///
/// Read-only with respect to the cache: network responses are never stored.
pub struct FetchInterceptor<S, F> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
  network: Arc<F>,
}

impl<S: CacheStorage, F: Fetch> FetchInterceptor<S, F> {
  pub fn new(config: Arc<WorkerConfig>, storage: Arc<S>, network: Arc<F>) -> Self {
    Self {
      config,
      storage,
      network,
    }
  }

  /// Resolve a request.
  ///
  /// 1. Look the request up in cache - on a hit, return it without touching the network
  /// 2. On a miss, fetch once from the network and return the result as is
  pub async fn respond(&self, request: &Request) -> Result<FetchResult> {
    let cached = match self.config.lookup {
      LookupScope::All => self.storage.match_any(request)?,
      LookupScope::Named => self.storage.match_in(&self.config.cache_name, request)?,
    };

    if let Some(hit) = cached {
      debug!(url = %request.url, cache = %hit.cache_name, "cache hit");
      return Ok(FetchResult::from_cache(
        hit.response,
        hit.cache_name,
        hit.cached_at,
      ));
    }

    debug!(method = %request.method, url = %request.url, "cache miss, going to network");
    let response = self.network.fetch(request).await?;
    Ok(FetchResult::from_network(response))
  }
}
