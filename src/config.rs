use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::Error;
use crate::http::Request;

const DEFAULT_ORIGIN: &str = "http://localhost:8099";

/// Which caches the fetch handler searches.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LookupScope {
  /// Every cache the worker owns, oldest first
  #[default]
  All,
  /// Only the cache named by `cache_name`
  Named,
}

/// Worker configuration, built once at startup and shared by every handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Name of the cache bucket; bump it to invalidate previously stored assets
  pub cache_name: String,
  /// Origin that same-origin asset paths resolve against
  pub origin: String,
  /// Assets pre-cached at install, in order
  pub assets: Vec<String>,
  /// Caches searched on fetch: every cache (default) or only `cache_name`
  pub lookup: LookupScope,
  /// Delete caches with other names when the worker activates
  pub prune_stale_caches: bool,
  /// Cache database path (defaults to the user data directory)
  pub database: Option<PathBuf>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      cache_name: "shopping-scanner".to_string(),
      origin: DEFAULT_ORIGIN.to_string(),
      assets: vec![
        "/local/shopping-scanner.html".to_string(),
        "/local/manifest.json".to_string(),
        "https://cdnjs.cloudflare.com/ajax/libs/quagga/0.12.1/quagga.min.js".to_string(),
      ],
      lookup: LookupScope::All,
      prune_stale_caches: false,
      database: None,
    }
  }
}

impl WorkerConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// Falls back to the built-in asset list when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: WorkerConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    self.asset_requests()?;
    Ok(())
  }

  /// The origin as a URL.
  pub fn origin_url(&self) -> crate::error::Result<Url> {
    Url::parse(&self.origin).map_err(|source| Error::InvalidUrl {
      locator: self.origin.clone(),
      source,
    })
  }

  /// Asset list resolved against the origin, in configured order.
  pub fn asset_requests(&self) -> crate::error::Result<Vec<Request>> {
    let origin = self.origin_url()?;
    self
      .assets
      .iter()
      .map(|locator| Request::resolve(&origin, locator))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_match_shopping_scanner() {
    let config = WorkerConfig::default();
    assert_eq!(config.cache_name, "shopping-scanner");
    assert_eq!(config.assets.len(), 3);
    assert_eq!(config.lookup, LookupScope::All);
    assert!(!config.prune_stale_caches);

    let urls: Vec<String> = config
      .asset_requests()
      .unwrap()
      .into_iter()
      .map(|r| r.url.to_string())
      .collect();
    assert_eq!(urls[0], "http://localhost:8099/local/shopping-scanner.html");
    assert_eq!(
      urls[2],
      "https://cdnjs.cloudflare.com/ajax/libs/quagga/0.12.1/quagga.min.js"
    );
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config: WorkerConfig = serde_yaml::from_str(
      "cache_name: scanner-v2\nlookup: named\nassets:\n  - /a.html\n",
    )
    .unwrap();
    assert_eq!(config.cache_name, "scanner-v2");
    assert_eq!(config.lookup, LookupScope::Named);
    assert_eq!(config.assets, vec!["/a.html"]);
    assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:8099/");
  }

  #[test]
  fn test_unparseable_origin_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "origin: 'not a url'").unwrap();
    assert!(WorkerConfig::load(Some(file.path())).is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "origin: https://ha.local\nprune_stale_caches: true\nassets: [/a.html, /b.json, 'https://x.test/c.js']"
    )
    .unwrap();

    let config = WorkerConfig::load(Some(file.path())).unwrap();
    assert!(config.prune_stale_caches);
    assert_eq!(config.asset_requests().unwrap()[1].url.as_str(), "https://ha.local/b.json");
  }

  #[test]
  fn test_load_missing_explicit_path_fails() {
    let result = WorkerConfig::load(Some(Path::new("/nonexistent/swcache.yaml")));
    assert!(result.is_err());
  }

  #[test]
  fn test_empty_cache_name_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache_name: ''").unwrap();
    assert!(WorkerConfig::load(Some(file.path())).is_err());
  }
}
