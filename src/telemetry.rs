//! Logging setup for the binary.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file writer flushing until dropped.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over `level`; `debug` forces debug level.
pub fn build_filter(level: &str, debug: bool) -> Result<EnvFilter> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level
            .parse::<tracing::Level>()
            .with_context(|| format!("Invalid log level '{level}'"))?
    };
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())))
}

/// Console logging, plus a plain-text copy in `file` when given.
pub fn init_logging(level: &str, debug: bool, file: Option<&Path>) -> Result<TelemetryGuard> {
    let filter = build_filter(level, debug)?;

    let (file_layer, guard) = match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(TelemetryGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_levels() {
        assert!(build_filter("loud", false).is_err());
        assert!(build_filter("loud", true).is_ok());
        assert!(build_filter("warn", false).is_ok());
    }
}
