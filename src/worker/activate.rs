//! Optional activate handler that prunes caches left by earlier versions.

use std::sync::Arc;
use tracing::info;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::Result;

pub struct Activator<S> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
}

impl<S: CacheStorage> Activator<S> {
  pub fn new(config: Arc<WorkerConfig>, storage: Arc<S>) -> Self {
    Self { config, storage }
  }

  /// Delete every cache not named `cache_name`. Returns the deleted names.
  pub fn run(&self) -> Result<Vec<String>> {
    let mut pruned = Vec::new();
    for name in self.storage.names()? {
      if name != self.config.cache_name && self.storage.delete(&name)? {
        info!(cache = %name, "pruned stale cache");
        pruned.push(name);
      }
    }
    Ok(pruned)
  }
}
