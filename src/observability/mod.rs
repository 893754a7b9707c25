//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway / tunnel / rate limiter
//!     → tracing events (one human-readable line each)
//!         → logging.rs: console layer (stderr) + file layer (Mutex<File>)
//!     → metrics.rs: counters, gauges, histograms
//!         → Prometheus listener (optional)
//! ```
//!
//! # Design Decisions
//! - Logging never fails the caller; file write errors stay in the subscriber
//! - Only opening the log file is fatal, and only at startup
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
