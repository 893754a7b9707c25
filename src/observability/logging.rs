//! Event logging to the console and an append-only log file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors raised while setting up the event logger.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log destination could not be opened for append.
    #[error("failed to open log file {path}: {source}")]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber was already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Open (creating if needed) the log file for appending.
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenLogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Build the level filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("forward_proxy={default_level},{default_level}"))
    })
}

/// Compose the event logger.
///
/// Every event is written as one line to stderr and, when `log_file` is
/// given, appended to that file. The file writer sits behind a single mutex
/// so concurrent events never interleave within a line.
pub fn build_subscriber(
    filter: EnvFilter,
    log_file: Option<File>,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
}

/// Install the event logger as the global subscriber.
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let file = log_file.map(open_log_file).transpose()?;

    build_subscriber(env_filter(default_level), file)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
