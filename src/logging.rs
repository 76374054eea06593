use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_LEVEL;

/// Maps a `log_level` config value to a filter directive.
pub fn parse_log_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// Installs the process-wide subscriber.
///
/// `RUST_LOG` wins over the configured level; `debug` wins over both.
/// A log file that cannot be opened falls back to stderr. Calling it again
/// is a no-op.
pub fn init(log_level: &str, log_file: Option<&Path>, debug: bool) {
    let level = parse_log_level(log_level);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LOG_LEVEL)))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let opened = log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path, e))
    });
    let failed = match opened {
        Some(Ok(file)) => {
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            None
        }
        Some(Err(failure)) => {
            let _ = builder.with_writer(io::stderr).try_init();
            Some(failure)
        }
        None => {
            let _ = builder.with_writer(io::stderr).try_init();
            None
        }
    };

    if let Some((path, e)) = failed {
        warn!("failed to open log file {}: {e}, logging to stderr", path.display());
    }
    if level.is_none() {
        warn!("unknown log_level in config file: {log_level}");
    }
}
