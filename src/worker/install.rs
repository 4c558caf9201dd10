//! Install handler: pre-caches the configured assets.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{request_key, CacheStorage};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::net::Fetch;

/// Populates the named cache with the full asset list.
///
/// All or nothing: if any asset cannot be fetched, or answers with a non-2xx
/// status, no entry from the batch is stored and the install fails.
pub struct Installer<S, F> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
  network: Arc<F>,
}

impl<S: CacheStorage, F: Fetch> Installer<S, F> {
  pub fn new(config: Arc<WorkerConfig>, storage: Arc<S>, network: Arc<F>) -> Self {
    Self {
      config,
      storage,
      network,
    }
  }

  /// Open the cache and add every asset. Returns the number of entries stored.
  pub async fn run(&self) -> Result<usize> {
    let cache = &self.config.cache_name;
    info!(cache = %cache, assets = self.config.assets.len(), "installing");

    match self.add_all().await {
      Ok(count) => {
        info!(cache = %cache, entries = count, "install complete");
        Ok(count)
      }
      Err(e) => {
        warn!(cache = %cache, error = %e, "install failed");
        Err(Error::InstallFailed {
          cache: cache.clone(),
          source: Box::new(e),
        })
      }
    }
  }

  async fn add_all(&self) -> Result<usize> {
    self.storage.open(&self.config.cache_name)?;

    let requests = self.config.asset_requests()?;
    check_batch(&requests)?;

    let responses = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;

    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    self.storage.put_all(&self.config.cache_name, &entries)?;

    Ok(entries.len())
  }

  async fn fetch_asset(&self, request: &Request) -> Result<Response> {
    let response = self.network.fetch(request).await?;
    if !response.ok() {
      return Err(Error::BadStatus {
        url: request.url.to_string(),
        status: response.status,
      });
    }
    Ok(response)
  }
}

/// Reject batches the cache could never store, before any network I/O.
fn check_batch(requests: &[Request]) -> Result<()> {
  let mut seen = HashSet::new();
  for request in requests {
    if !request.is_http() {
      return Err(Error::UnsupportedScheme(request.url.to_string()));
    }
    if !seen.insert(request_key(request)) {
      return Err(Error::InvalidState(format!(
        "duplicate request in batch: {}",
        request.url
      )));
    }
  }
  Ok(())
}
