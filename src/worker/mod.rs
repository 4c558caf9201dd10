//! The offline asset worker.
//!
//! A worker owns an immutable configuration, a cache store and a network
//! client, and registers its handlers in a dispatch table:
//! - `install`: pre-cache the asset list ([`Installer`])
//! - `fetch`: cache-first response substitution ([`FetchInterceptor`])
//! - `activate`: prune caches with other names ([`Activator`]), only when
//!   `prune_stale_caches` is set
//!
//! Lifecycle: parsed -> installing -> installed -> activating -> activated.
//! A failed install leaves the worker redundant. Fetches reach the handler
//! only while the worker is activated; otherwise they go straight to the
//! network.

mod activate;
mod dispatch;
mod fetch;
mod install;
#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{Event, EventKind, Outcome};
pub use fetch::{FetchResult, ResponseSource};

use activate::Activator;
use dispatch::Dispatcher;
use fetch::FetchInterceptor;
use install::Installer;

use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::http::Request;
use crate::net::Fetch;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this worker never activates
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

pub struct ServiceWorker<S, F> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
  network: Arc<F>,
  dispatcher: Dispatcher,
  state: Mutex<WorkerState>,
}

impl<S, F> ServiceWorker<S, F>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  /// Create a worker in the `parsed` state with its handlers registered.
  pub fn new(config: WorkerConfig, storage: S, network: F) -> Self {
    let config = Arc::new(config);
    let storage = Arc::new(storage);
    let network = Arc::new(network);
    let mut dispatcher = Dispatcher::new();

    let installer = Arc::new(Installer::new(
      config.clone(),
      storage.clone(),
      network.clone(),
    ));
    dispatcher.on(
      EventKind::Install,
      Box::new(move |_: Event| {
        let installer = installer.clone();
        async move {
          let entries = installer.run().await?;
          Ok::<_, Error>(Outcome::Installed { entries })
        }
        .boxed()
      }),
    );

    let interceptor = Arc::new(FetchInterceptor::new(
      config.clone(),
      storage.clone(),
      network.clone(),
    ));
    dispatcher.on(
      EventKind::Fetch,
      Box::new(move |event: Event| {
        let interceptor = interceptor.clone();
        async move {
          match event {
            Event::Fetch(request) => {
              let result = interceptor.respond(&request).await?;
              Ok::<_, Error>(Outcome::Respond(result))
            }
            other => Err(Error::InvalidState(format!(
              "fetch handler received {} event",
              other.kind()
            ))),
          }
        }
        .boxed()
      }),
    );

    if config.prune_stale_caches {
      let activator = Arc::new(Activator::new(config.clone(), storage.clone()));
      dispatcher.on(
        EventKind::Activate,
        Box::new(move |_: Event| {
          let activator = activator.clone();
          async move {
            let pruned = activator.run()?;
            Ok::<_, Error>(Outcome::Activated { pruned })
          }
          .boxed()
        }),
      );
    }

    Self {
      config,
      storage,
      network,
      dispatcher,
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  /// Rebuild a worker over an existing cache store.
  ///
  /// The worker comes up activated when the named cache already holds every
  /// configured asset, i.e. a previous install of this version succeeded.
  pub fn resume(config: WorkerConfig, storage: S, network: F) -> Result<Self> {
    let worker = Self::new(config, storage, network);
    if worker.is_warm()? {
      worker.set_state(WorkerState::Activated);
    }
    Ok(worker)
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, next: WorkerState) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if *state != next {
      debug!(from = %*state, to = %next, "worker state change");
      *state = next;
    }
  }

  fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<()> {
    let current = self.state();
    if current != expected {
      return Err(Error::InvalidState(format!(
        "worker is {}, expected {}",
        current, expected
      )));
    }
    self.set_state(next);
    Ok(())
  }

  fn is_warm(&self) -> Result<bool> {
    if !self.storage.has(&self.config.cache_name)? {
      return Ok(false);
    }
    let stored: HashSet<String> = self
      .storage
      .keys(&self.config.cache_name)?
      .into_iter()
      .collect();
    Ok(
      self
        .config
        .asset_requests()?
        .iter()
        .all(|r| stored.contains(&r.match_url())),
    )
  }

  /// Raw dispatch of an event to its registered handler.
  #[cfg(test)]
  pub async fn dispatch(&self, event: Event) -> Result<Outcome> {
    self.dispatcher.dispatch(event).await
  }

  /// Fire the install event and wait until the cache is warm.
  ///
  /// On failure the worker becomes redundant; there is no retry.
  pub async fn install(&self) -> Result<usize> {
    self.transition(WorkerState::Parsed, WorkerState::Installing)?;

    match self.dispatcher.dispatch(Event::Install).await {
      Ok(Outcome::Installed { entries }) => {
        self.set_state(WorkerState::Installed);
        Ok(entries)
      }
      Ok(other) => {
        self.set_state(WorkerState::Redundant);
        Err(Error::InvalidState(format!(
          "install handler resolved with {:?}",
          other
        )))
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  /// Fire the activate event, if a handler is registered, and take control.
  ///
  /// A failing activate handler is logged but does not stop activation.
  pub async fn activate(&self) -> Result<Vec<String>> {
    self.transition(WorkerState::Installed, WorkerState::Activating)?;

    let mut pruned = Vec::new();
    if self.dispatcher.handles(EventKind::Activate) {
      match self.dispatcher.dispatch(Event::Activate).await {
        Ok(Outcome::Activated { pruned: names }) => pruned = names,
        Ok(_) => {}
        Err(e) => warn!(error = %e, "activate handler failed"),
      }
    }

    self.set_state(WorkerState::Activated);
    info!(cache = %self.config.cache_name, "worker activated");
    Ok(pruned)
  }

  /// Fire the activate event on a worker whose install succeeded.
  ///
  /// An installed worker activates as usual. An already active worker
  /// re-runs its activate handler. Any other state is refused, so a failed
  /// or missing install can never prune the caches still serving requests.
  pub async fn reactivate(&self) -> Result<Vec<String>> {
    match self.state() {
      WorkerState::Installed => self.activate().await,
      WorkerState::Activated => match self.dispatcher.dispatch(Event::Activate).await? {
        Outcome::Activated { pruned } => Ok(pruned),
        _ => Ok(Vec::new()),
      },
      other => Err(Error::InvalidState(format!(
        "worker is {}, cache '{}' has not been installed",
        other, self.config.cache_name
      ))),
    }
  }

  /// Install, then activate.
  pub async fn start(&self) -> Result<usize> {
    let entries = self.install().await?;
    self.activate().await?;
    Ok(entries)
  }

  /// Resolve a request the way a controlled page would see it.
  pub async fn fetch(&self, request: Request) -> Result<FetchResult> {
    if self.state() != WorkerState::Activated {
      debug!(url = %request.url, state = %self.state(), "worker not active, passing through");
      let response = self.network.fetch(&request).await?;
      return Ok(FetchResult::from_network(response));
    }

    match self.dispatcher.dispatch(Event::Fetch(request)).await? {
      Outcome::Respond(result) => Ok(result),
      other => Err(Error::InvalidState(format!(
        "fetch handler resolved with {:?}",
        other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use super::testing::{request, StubFetcher};

  fn scanner_config() -> WorkerConfig {
    WorkerConfig {
      cache_name: "shopping-scanner".into(),
      origin: "https://app.test".into(),
      assets: vec![
        "/a.html".into(),
        "/b.json".into(),
        "https://x.test/c.js".into(),
      ],
      ..WorkerConfig::default()
    }
  }

  fn scanner_network() -> StubFetcher {
    StubFetcher::new()
      .reply("https://app.test/a.html", 200, "<html>")
      .reply("https://app.test/b.json", 200, "{}")
      .reply("https://x.test/c.js", 200, "js")
      .reply("https://app.test/api/states", 200, "[]")
  }

  fn worker(config: WorkerConfig, network: StubFetcher) -> ServiceWorker<SqliteStorage, StubFetcher> {
    ServiceWorker::new(config, SqliteStorage::open_in_memory().unwrap(), network)
  }

  #[tokio::test]
  async fn test_start_warms_cache_with_exactly_the_assets() {
    let worker = worker(scanner_config(), scanner_network());

    assert_eq!(worker.start().await.unwrap(), 3);
    assert_eq!(worker.state(), WorkerState::Activated);
    assert_eq!(
      worker.storage().keys("shopping-scanner").unwrap(),
      vec![
        "https://app.test/a.html",
        "https://app.test/b.json",
        "https://x.test/c.js"
      ]
    );
  }

  #[tokio::test]
  async fn test_assets_served_from_cache_after_install() {
    let worker = worker(scanner_config(), scanner_network());
    worker.start().await.unwrap();

    for url in [
      "https://app.test/a.html",
      "https://app.test/b.json",
      "https://x.test/c.js",
    ] {
      let result = worker.fetch(request(url)).await.unwrap();
      assert_eq!(result.source, ResponseSource::Cache);
    }
    assert_eq!(worker.network.total_calls(), 3);

    let api = worker
      .fetch(request("https://app.test/api/states"))
      .await
      .unwrap();
    assert_eq!(api.source, ResponseSource::Network);
    assert_eq!(worker.storage().keys("shopping-scanner").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_failed_install_leaves_worker_redundant() {
    let network = StubFetcher::new()
      .reply("https://app.test/a.html", 200, "<html>")
      .reply("https://app.test/b.json", 200, "{}")
      .reply("https://app.test/api/states", 200, "[]");
    let worker = worker(scanner_config(), network);

    assert!(matches!(
      worker.start().await,
      Err(Error::InstallFailed { .. })
    ));
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(worker.activate().await.is_err());

    // Uncontrolled: straight to network, nothing was cached
    let result = worker.fetch(request("https://app.test/a.html")).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert!(worker.storage().keys("shopping-scanner").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_runs_once_per_worker() {
    let worker = worker(scanner_config(), scanner_network());
    worker.install().await.unwrap();
    assert!(matches!(
      worker.install().await,
      Err(Error::InvalidState(_))
    ));
  }

  #[tokio::test]
  async fn test_no_activate_handler_by_default() {
    let worker = worker(scanner_config(), scanner_network());
    worker.storage().open("scanner-v0").unwrap();
    worker.start().await.unwrap();

    assert!(matches!(
      worker.dispatch(Event::Activate).await,
      Err(Error::NoHandler(EventKind::Activate))
    ));
    assert_eq!(
      worker.storage().names().unwrap(),
      vec!["scanner-v0", "shopping-scanner"]
    );
  }

  #[tokio::test]
  async fn test_prune_on_activate_when_enabled() {
    let config = WorkerConfig {
      prune_stale_caches: true,
      ..scanner_config()
    };
    let worker = worker(config, scanner_network());
    worker.storage().open("scanner-v0").unwrap();

    worker.install().await.unwrap();
    assert_eq!(worker.activate().await.unwrap(), vec!["scanner-v0"]);
    assert_eq!(worker.storage().names().unwrap(), vec!["shopping-scanner"]);
  }

  #[tokio::test]
  async fn test_resume_activates_only_a_warm_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.db");

    let cold = ServiceWorker::resume(
      scanner_config(),
      SqliteStorage::open(&path).unwrap(),
      scanner_network(),
    )
    .unwrap();
    assert_eq!(cold.state(), WorkerState::Parsed);
    cold.start().await.unwrap();

    let warm = ServiceWorker::resume(
      scanner_config(),
      SqliteStorage::open(&path).unwrap(),
      StubFetcher::new(),
    )
    .unwrap();
    assert_eq!(warm.state(), WorkerState::Activated);
    let result = warm.fetch(request("https://x.test/c.js")).await.unwrap();
    assert_eq!(result.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_reactivate_refuses_cold_worker_and_keeps_old_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.db");

    let v1 = WorkerConfig {
      cache_name: "scanner-v1".into(),
      ..scanner_config()
    };
    ServiceWorker::new(v1, SqliteStorage::open(&path).unwrap(), scanner_network())
      .start()
      .await
      .unwrap();

    let v2 = WorkerConfig {
      cache_name: "scanner-v2".into(),
      prune_stale_caches: true,
      assets: vec!["/a.html".into(), "/gone.js".into()],
      ..scanner_config()
    };
    let failed = ServiceWorker::new(v2.clone(), SqliteStorage::open(&path).unwrap(), scanner_network());
    assert!(failed.install().await.is_err());

    let resumed = ServiceWorker::resume(v2, SqliteStorage::open(&path).unwrap(), scanner_network()).unwrap();
    assert_eq!(resumed.state(), WorkerState::Parsed);
    assert!(matches!(
      resumed.reactivate().await,
      Err(Error::InvalidState(_))
    ));

    let names = resumed.storage().names().unwrap();
    assert!(names.contains(&"scanner-v1".to_string()));
    assert_eq!(resumed.storage().keys("scanner-v1").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_reactivate_prunes_from_warm_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.db");

    let v1 = WorkerConfig {
      cache_name: "scanner-v1".into(),
      ..scanner_config()
    };
    ServiceWorker::new(v1, SqliteStorage::open(&path).unwrap(), scanner_network())
      .start()
      .await
      .unwrap();

    let v2 = WorkerConfig {
      cache_name: "scanner-v2".into(),
      prune_stale_caches: true,
      ..scanner_config()
    };
    let fresh = ServiceWorker::new(v2.clone(), SqliteStorage::open(&path).unwrap(), scanner_network());
    fresh.install().await.unwrap();
    drop(fresh);

    let warm = ServiceWorker::resume(v2, SqliteStorage::open(&path).unwrap(), scanner_network()).unwrap();
    assert_eq!(warm.state(), WorkerState::Activated);
    assert_eq!(warm.reactivate().await.unwrap(), vec!["scanner-v1"]);
    assert_eq!(warm.storage().names().unwrap(), vec!["scanner-v2"]);
  }
}
