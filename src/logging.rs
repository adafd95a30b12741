//! Tracing setup shared by the binaries

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// CLI commands and the API server
    Stderr,
    /// Full-screen TUI: anything on the terminal would tear the display
    File,
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Keep the returned guard alive until exit, or buffered file lines are lost.
pub fn init_logging(config: &LoggingConfig, target: LogTarget) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vehicle_access={},tower_http=info", config.level).into());

    let json = config.format.eq_ignore_ascii_case("json");

    let (layer, guard): (Box<dyn Layer<Registry> + Send + Sync>, Option<WorkerGuard>) = match target {
        LogTarget::Stderr => {
            let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if json {
                (fmt.json().boxed(), None)
            } else {
                (fmt.boxed(), None)
            }
        }
        LogTarget::File => {
            std::fs::create_dir_all(&config.directory)
                .with_context(|| format!("Failed to create log directory {:?}", config.directory))?;
            let appender = tracing_appender::rolling::daily(&config.directory, "vehicle-access.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let fmt = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            if json {
                (fmt.json().boxed(), Some(guard))
            } else {
                (fmt.boxed(), Some(guard))
            }
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
