//! Startup orchestration.
//!
//! # Responsibilities
//! - Parse command-line flags
//! - Load and validate configuration, then apply CLI overrides
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Logging starts only after the configuration is known to be valid

use std::path::PathBuf;

use clap::Parser;

use crate::config::validation::validate_config;
use crate::config::{read_config, ConfigError, ProxyConfig};

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Caching, rate-limited forward HTTP proxy with CONNECT tunneling", long_about = None)]
pub struct Args {
    /// File to log all events
    #[arg(long, default_value = "proxy.log")]
    pub logfile: PathBuf,

    /// Optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the configuration (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    pub listen: Option<String>,
}

/// Build the effective configuration from flags and the optional file.
///
/// Validation runs once, on the merged result.
pub fn resolve_config(args: &Args) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(listen) = &args.listen {
        config.listener.bind_address = listen.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
