//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_cache_lookups_total` (counter): lookups by result (hit/miss)
//! - `proxy_cache_entries` (gauge): entries held by the cache store
//! - `proxy_rate_limited_total` (counter): rejected requests
//! - `proxy_rate_limit_resets_total` (counter): window resets
//! - `proxy_tunnels_active` (gauge): live CONNECT tunnels
//! - `proxy_tunnel_failures_total` (counter): tunnel failures by reason

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_rate_limited() {
    metrics::counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_rate_limit_reset() {
    metrics::counter!("proxy_rate_limit_resets_total").increment(1);
}

pub fn tunnel_opened() {
    metrics::gauge!("proxy_tunnels_active").increment(1.0);
}

pub fn tunnel_closed() {
    metrics::gauge!("proxy_tunnels_active").decrement(1.0);
}

pub fn record_tunnel_failure(reason: &'static str) {
    metrics::counter!("proxy_tunnel_failures_total", "reason" => reason).increment(1);
}
