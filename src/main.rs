//! Forward HTTP proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                    FORWARD PROXY                     │
//!                        │                                                      │
//!   Client Request       │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!   ─────────────────────┼─▶│   net   │───▶│  http   │───▶│ rate limiter │      │
//!                        │  │listener │    │ server  │    │  (security)  │      │
//!                        │  └─────────┘    └─────────┘    └──────┬───────┘      │
//!                        │                                       │              │
//!                        │                    CONNECT ┌──────────┴───┐ other    │
//!                        │                            ▼              ▼          │
//!                        │                     ┌──────────┐   ┌──────────┐      │
//!                        │                     │  tunnel  │   │ gateway  │◀──┐  │
//!                        │                     └────┬─────┘   └────┬─────┘   │  │
//!                        │                          │              │    ┌────┴┐ │
//!                        │                   raw TCP relay   HTTP client│cache│ │
//!                        │                          │              │    └─────┘ │
//!                        └──────────────────────────┼──────────────┼────────────┘
//!                                                   ▼              ▼
//!                                              destination      origin
//! ```

use clap::Parser;

use forward_proxy::config::ProxyConfig;
use forward_proxy::http::HttpServer;
use forward_proxy::lifecycle::startup::{resolve_config, Args};
use forward_proxy::lifecycle::{signals, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: ProxyConfig = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.observability.log_level, Some(&args.logfile)) {
        eprintln!("Error opening log file: {e}");
        std::process::exit(1);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        rate_limit = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        cache_enabled = config.cache.enabled,
        log_file = %args.logfile.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
