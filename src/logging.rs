//! Tracing subscriber setup.
//!
//! Console output is pretty or JSON per [`LogFormat`]. When a log directory is
//! configured, JSON lines are also written to a daily rolling file.
//! `RUST_LOG` overrides the configured filter.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSection};

pub const LOG_FILE_PREFIX: &str = "sportshub.log";

/// Build the filter: `RUST_LOG` when set, else the configured directives.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter '{}'", directives)),
    }
}

/// Install the global subscriber. Hold the returned guard for the life of the
/// process so buffered file output is flushed on exit.
pub fn init_logging(config: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.filter)?;

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init(),
    };
    result.context("Failed to install tracing subscriber")?;

    Ok(guard)
}
