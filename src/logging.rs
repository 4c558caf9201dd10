use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Human-readable output goes to stderr; a daily-rolling copy is written
/// under `$XDG_DATA_HOME/swcache/logs`. `RUST_LOG` overrides the level.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(verbose: bool) -> Result<Option<WorkerGuard>> {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let (file_layer, guard) = match dirs::data_dir() {
    Some(data_dir) => {
      let log_dir = data_dir.join("swcache").join("logs");
      std::fs::create_dir_all(&log_dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(log_dir, "swcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  Ok(guard)
}
