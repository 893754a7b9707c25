//! CONNECT tunneling.
//!
//! The handler dials the destination, checks that the inbound connection can
//! hand over its raw stream, answers `200`, and then relays bytes in both
//! directions without looking at them. Nothing on this path touches the
//! cache, and tunneled bytes are not rate accounted.

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::lifecycle::shutdown::cancelled;
use crate::net::ConnectionLease;
use crate::observability::metrics;
use crate::resilience::{with_deadline, DeadlineExceeded};

/// `host:port` named by a CONNECT request.
pub fn tunnel_target<B>(request: &Request<B>) -> Result<String, ProxyError> {
    request
        .uri()
        .authority()
        .map(|authority| authority.to_string())
        .ok_or_else(|| ProxyError::InvalidTunnelTarget(request.uri().to_string()))
}

pub struct TunnelHandler {
    connect_timeout: Option<Duration>,
    shutdown: watch::Receiver<bool>,
}

impl TunnelHandler {
    /// `shutdown` flips to `true` when live tunnels must be torn down.
    pub fn new(connect_timeout: Option<Duration>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            connect_timeout,
            shutdown,
        }
    }

    /// Serve one CONNECT request.
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        match self.open(&mut request).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ProxyError::TunnelConnect { host, reason } => {
                        metrics::record_tunnel_failure("connect");
                        tracing::error!("Failed to connect to destination: {}, error: {}", host, reason);
                    }
                    ProxyError::UpgradeUnsupported => {
                        metrics::record_tunnel_failure("unsupported");
                        tracing::error!("Tunneling not supported on this connection");
                    }
                    other if other.is_server_error() => {
                        tracing::error!("Failed to open tunnel: {}", other)
                    }
                    other => tracing::warn!("Rejecting CONNECT request: {}", other),
                }
                e.into_response()
            }
        }
    }

    async fn open(&self, request: &mut Request<Body>) -> Result<Response, ProxyError> {
        let host = tunnel_target(request)?;

        let upstream = match with_deadline(self.connect_timeout, TcpStream::connect(host.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ProxyError::TunnelConnect {
                    host,
                    reason: e.to_string(),
                })
            }
            Err(DeadlineExceeded(limit)) => {
                return Err(ProxyError::TunnelConnect {
                    host,
                    reason: format!("timed out after {limit:?}"),
                })
            }
        };

        // Raw takeover is only possible when the server connection was built
        // with upgrades enabled.
        let on_upgrade = request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(ProxyError::UpgradeUnsupported)?;

        // The relay outlives the HTTP connection task, so it takes over the
        // connection's slot.
        let lease = request.extensions_mut().remove::<ConnectionLease>();
        tokio::spawn(relay(host, on_upgrade, upstream, lease, self.shutdown.clone()).in_current_span());

        Ok(Response::new(Body::empty()))
    }
}

/// Copy bytes both ways until either direction ends, then close both ends.
///
/// client → upstream runs in its own task; upstream → client runs here.
async fn relay(
    host: String,
    on_upgrade: OnUpgrade,
    upstream: TcpStream,
    _lease: Option<ConnectionLease>,
    mut shutdown: watch::Receiver<bool>,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            metrics::record_tunnel_failure("takeover");
            tracing::error!("Failed to take over connection: {}, error: {}", host, e);
            return;
        }
    };

    metrics::tunnel_opened();
    tracing::debug!(destination = %host, "Tunnel established");

    let (mut client_read, mut client_write) = tokio::io::split(TokioIo::new(upgraded));
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    let mut to_upstream = tokio::spawn(
        async move { tokio::io::copy(&mut client_read, &mut upstream_write).await }.in_current_span(),
    );

    tokio::select! {
        result = tokio::io::copy(&mut upstream_read, &mut client_write) => match result {
            Ok(bytes) => tracing::debug!(destination = %host, bytes, "Upstream closed tunnel"),
            Err(e) => tracing::debug!(destination = %host, error = %e, "Upstream to client copy failed"),
        },
        result = &mut to_upstream => match result {
            Ok(Ok(bytes)) => tracing::debug!(destination = %host, bytes, "Client closed tunnel"),
            Ok(Err(e)) => tracing::debug!(destination = %host, error = %e, "Client to upstream copy failed"),
            Err(e) => tracing::debug!(destination = %host, error = %e, "Client to upstream task ended"),
        },
        _ = cancelled(&mut shutdown) => {
            tracing::debug!(destination = %host, "Tunnel cancelled by shutdown");
        }
    }

    to_upstream.abort();
    let _ = client_write.shutdown().await;
    metrics::tunnel_closed();
}
