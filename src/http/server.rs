//! HTTP server setup and connection dispatch.
//!
//! # Responsibilities
//! - Accept connections and serve HTTP/1.1 on each, with upgrades enabled
//! - Attach the peer address to every request
//! - Gate every request through the rate limiter
//! - Dispatch CONNECT to the tunnel handler, everything else to the gateway
//! - Run the rate-limit window timer
//! - Drain connections on shutdown

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::http::proxy::Gateway;
use crate::http::tunnel::TunnelHandler;
use crate::lifecycle::shutdown::cancelled;
use crate::net::{ConnectionLease, ConnectionPermit, ConnectionTracker, Listener};
use crate::security::rate_limit::RateLimit;
use crate::security::{RateLimitLayer, RateLimiter};

/// How long shutdown waits for in-flight connections.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Method-based dispatch behind the rate limiter.
#[derive(Clone)]
pub struct ProxyService {
    gateway: Arc<Gateway>,
    tunnel: Arc<TunnelHandler>,
}

impl ProxyService {
    pub fn new(gateway: Arc<Gateway>, tunnel: Arc<TunnelHandler>) -> Self {
        Self { gateway, tunnel }
    }
}

impl Service<Request<Body>> for ProxyService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let response = if request.method() == Method::CONNECT {
                this.tunnel.handle(request).await
            } else {
                this.gateway.handle(request).await
            };
            Ok(response)
        })
    }
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    config: ProxyConfig,
    cache: Arc<CacheStore>,
    limiter: RateLimiter,
    connections: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let cache = Arc::new(CacheStore::new());
        let limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config,
            cache,
            limiter,
            connections: ConnectionTracker::new(),
        }
    }

    /// Handle to the response cache.
    pub fn cache(&self) -> Arc<CacheStore> {
        self.cache.clone()
    }

    /// Handle to the live connection tracker. Upgraded tunnels stay counted
    /// until they close.
    pub fn connections(&self) -> ConnectionTracker {
        self.connections.clone()
    }

    /// Build the full request pipeline: rate limiter wrapping dispatch.
    fn service(&self) -> std::io::Result<RateLimit<ProxyService>> {
        let gateway = Gateway::new(&self.config, self.cache.clone()).map_err(std::io::Error::other)?;
        let tunnel = TunnelHandler::new(
            self.config.timeouts.connect(),
            self.connections.shutdown_receiver(),
        );
        Ok(RateLimitLayer::new(self.limiter.clone())
            .layer(ProxyService::new(Arc::new(gateway), Arc::new(tunnel))))
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let service = self.service()?;
        tracing::info!("Proxy server started on {}", addr);

        let reset_task = self
            .config
            .rate_limit
            .enabled
            .then(|| self.limiter.spawn_reset_task(shutdown.resubscribe()));

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        self.serve_connection(stream, peer, permit, service.clone());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!(
            active_connections = self.connections.active_count(),
            "Stopped accepting connections"
        );
        self.connections.begin_shutdown();
        if let Some(task) = reset_task {
            task.abort();
        }
        if !self.connections.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active_connections = self.connections.active_count(),
                "Drain timeout reached, abandoning connections"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve one accepted connection on its own task.
    fn serve_connection<S>(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit, service: S)
    where
        S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        let lease = ConnectionLease::new(permit, self.connections.track());
        let mut cancel = self.connections.shutdown_receiver();
        let span = tracing::debug_span!("connection", id = %lease.id(), peer = %peer);

        tokio::spawn(
            async move {
                // Each request carries a clone; a tunnel keeps its clone after
                // this task ends.
                let hyper_service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                    request.extensions_mut().insert(ConnectInfo(peer));
                    request.extensions_mut().insert(lease.clone());
                    let mut service = service.clone();
                    service.call(request.map(Body::new))
                });

                let conn = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), hyper_service)
                    .with_upgrades();
                tokio::pin!(conn);

                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!(error = %e, "Connection error");
                        }
                    }
                    _ = cancelled(&mut cancel) => {
                        conn.as_mut().graceful_shutdown();
                        if let Err(e) = conn.await {
                            tracing::debug!(error = %e, "Connection error during shutdown");
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}
