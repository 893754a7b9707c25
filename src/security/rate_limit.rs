//! Fixed-window per-client rate limiting.
//!
//! Every client IP gets `max_requests` admissions per window. At each window
//! boundary the whole counter set is replaced by an empty one, for every
//! client at once. A client admitted at the tail of one window gets a full
//! fresh quota immediately after the reset.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::{Layer, Service};

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::observability::metrics;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; carries the count after this request.
    Admitted(u32),
    /// Ceiling reached; the counter was not incremented.
    Rejected(u32),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

struct Inner {
    counters: Mutex<HashMap<String, u32>>,
    max_requests: u32,
    window: Duration,
    enabled: bool,
}

/// Shared per-IP request counters.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                counters: Mutex::new(HashMap::new()),
                max_requests: config.max_requests,
                window: config.window(),
                enabled: config.enabled,
            }),
        }
    }

    /// Check and count one request from `ip`.
    pub fn check(&self, ip: &str) -> Admission {
        if !self.inner.enabled {
            return Admission::Admitted(0);
        }

        let mut counters = self.inner.counters.lock().unwrap_or_else(|e| e.into_inner());
        let count = counters.get(ip).copied().unwrap_or(0);
        if count >= self.inner.max_requests {
            return Admission::Rejected(count);
        }
        counters.insert(ip.to_string(), count + 1);
        Admission::Admitted(count + 1)
    }

    /// Current count for `ip` in this window.
    pub fn count(&self, ip: &str) -> u32 {
        let counters = self.inner.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(ip).copied().unwrap_or(0)
    }

    /// Number of clients tracked in the current window.
    pub fn tracked_clients(&self) -> usize {
        self.inner.counters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop every counter. Clients are recreated lazily on their next request.
    pub fn reset(&self) {
        let mut counters = self.inner.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters = HashMap::new();
    }

    /// Spawn the timer that resets all counters once per window.
    ///
    /// The first reset fires one full window after the call. The task ends
    /// when `shutdown` fires or its sender is dropped.
    pub fn spawn_reset_task(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = self.clone();
        let window = self.inner.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + window, window);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.reset();
                        metrics::record_rate_limit_reset();
                        tracing::debug!(window = ?window, "Rate limit window reset");
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

/// Extract the client IP from a remote address.
///
/// Splits `host:port` (including `[v6]:port`); anything that cannot be split
/// is returned unchanged.
pub fn client_ip(remote_addr: &str) -> String {
    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if !remote_addr.contains(':') {
        return remote_addr.to_string();
    }
    if let Some(rest) = remote_addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, _port)) => host.to_string(),
            None => remote_addr.to_string(),
        };
    }
    match remote_addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => host.to_string(),
        _ => remote_addr.to_string(),
    }
}

/// Layer that gates an inner service behind a [`RateLimiter`].
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimit {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
///
/// Rejected requests never reach the inner service.
#[derive(Clone)]
pub struct RateLimit<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> Service<Request<Body>> for RateLimit<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let ip = match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => client_ip(&addr.to_string()),
            None => "unknown".to_string(),
        };

        match self.limiter.check(&ip) {
            Admission::Admitted(count) => {
                tracing::info!("Client {} has made {} requests", ip, count.saturating_sub(1));
                // Take the ready service, leave a fresh clone behind.
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                Box::pin(async move { inner.call(request).await })
            }
            Admission::Rejected(count) => {
                tracing::info!("Client {} has made {} requests", ip, count);
                tracing::warn!("Rate limit exceeded for client {}", ip);
                metrics::record_rate_limited();
                Box::pin(async move { Ok(ProxyError::RateLimited(ip).into_response()) })
            }
        }
    }
}
