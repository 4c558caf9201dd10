mod cache;
mod config;
mod error;
mod http;
mod logging;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;

use cache::{CacheStorage, SqliteStorage};
use config::WorkerConfig;
use http::Request;
use net::HttpFetcher;
use worker::{ResponseSource, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "A cache-first offline asset worker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database (overrides the config file)
  #[arg(short, long)]
  database: Option<PathBuf>,

  /// Log at debug level
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache every configured asset, then activate
  Install,
  /// Resolve a request cache-first
  Fetch {
    url: String,
    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Extra request header, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List request URLs stored in a cache
  Keys {
    /// Cache name (defaults to the configured one)
    #[arg(long)]
    cache: Option<String>,
  },
  /// List cache names, oldest first
  Caches,
  /// Fire the activate event
  Activate,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose)?;

  // Load configuration
  let config = WorkerConfig::load(args.config.as_deref())?;

  let db_path = args
    .database
    .or_else(|| config.database.clone())
    .or_else(SqliteStorage::default_path)
    .ok_or_else(|| eyre!("Could not determine data directory for the cache database"))?;
  let storage = SqliteStorage::open(&db_path)?;
  let network = HttpFetcher::new()?;

  match args.command {
    Command::Install => {
      let worker = ServiceWorker::new(config, storage, network);
      let entries = worker.start().await?;
      eprintln!(
        "installed {} entries into '{}'",
        entries,
        worker.config().cache_name
      );
    }
    Command::Fetch {
      url,
      method,
      headers,
      output,
    } => {
      let origin = config.origin_url()?;
      let worker = ServiceWorker::resume(config, storage, network)?;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let request = Request::resolve(&origin, &url)?;
      let mut request = Request::new(method, request.url);
      for header in headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", header))?;
        request = request.with_header(name.trim(), value.trim());
      }

      let result = worker.fetch(request).await?;
      let source = match result.source {
        ResponseSource::Cache => format!(
          "cache '{}', stored {}",
          result.cache_name.as_deref().unwrap_or_default(),
          result
            .cached_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default()
        ),
        ResponseSource::Network => "network".to_string(),
      };
      eprintln!(
        "{} {} (from {}, {})",
        result.response.status,
        result.response.status_text,
        source,
        result
          .response
          .header("content-type")
          .unwrap_or("no content-type")
      );

      match output {
        Some(path) => std::fs::write(&path, &result.response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout().write_all(&result.response.body)?,
      }
    }
    Command::Keys { cache } => {
      let name = cache.unwrap_or(config.cache_name);
      if !storage.has(&name)? {
        return Err(eyre!("No cache named '{}'", name));
      }
      for key in storage.keys(&name)? {
        println!("{}", key);
      }
    }
    Command::Caches => {
      for name in storage.names()? {
        println!("{}", name);
      }
    }
    Command::Activate => {
      let worker = ServiceWorker::resume(config, storage, network)?;
      match worker.reactivate().await {
        Ok(pruned) => {
          for name in pruned {
            eprintln!("pruned '{}'", name);
          }
        }
        Err(error::Error::NoHandler(_)) => {
          eprintln!("no activate handler registered (prune_stale_caches is off)");
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  Ok(())
}
