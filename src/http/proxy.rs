//! Plain-HTTP forwarding with response body caching.
//!
//! # Request Path
//! ```text
//! request (origin-form or absolute-form)
//!     → target_url (absolute URL, 400 on parse failure)
//!     → cache lookup ── hit ──→ 200 + cached body, no upstream headers
//!     → build outbound request (same method, verbatim headers, streamed body)
//!     → upstream dispatch + full body buffering (deadline-bound)
//!     → cache store (overwrite) → relay status, headers, body
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Uri};
use axum::response::{IntoResponse, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::cache::{CacheKey, CacheStore};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::resilience::{with_deadline, DeadlineExceeded};

/// Rewrite the request target into an absolute URL.
///
/// Absolute-form targets are used as-is; origin-form targets are prefixed
/// with `http://` and the request's declared host.
pub fn target_url<B>(request: &Request<B>) -> Result<Url, ProxyError> {
    let uri = request.uri();
    let raw = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or_default();
        if host.is_empty() {
            return Err(ProxyError::MalformedUrl(format!("{uri}: missing host")));
        }
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("http://{host}{path}")
    };

    let url = Url::parse(&raw).map_err(|e| ProxyError::MalformedUrl(format!("{raw}: {e}")))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProxyError::MalformedUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// Build the outbound request: same method and body, every inbound header
/// copied verbatim.
fn upstream_request(request: Request<Body>, url: &Url) -> Result<Request<Body>, ProxyError> {
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| ProxyError::RequestBuild(e.to_string()))?;
    let (parts, body) = request.into_parts();

    let mut builder = Request::builder().method(parts.method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
    }
    builder
        .body(body)
        .map_err(|e| ProxyError::RequestBuild(e.to_string()))
}

/// The plain-HTTP side of the proxy.
///
/// Absolute-form targets may name `http` or `https` origins; the latter are
/// verified against the webpki root set.
pub struct Gateway {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    cache: Arc<CacheStore>,
    cache_enabled: bool,
    body_limit: usize,
    request_timeout: Option<Duration>,
}

impl Gateway {
    pub fn new(config: &ProxyConfig, cache: Arc<CacheStore>) -> Result<Self, rustls::Error> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(config.timeouts.connect());
        http.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            cache,
            cache_enabled: config.cache.enabled,
            body_limit: config.cache.body_limit(),
            request_timeout: config.timeouts.request(),
        })
    }

    /// Serve one plain-HTTP request. Never fails: errors become responses.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();

        let response = match target_url(&request) {
            Ok(url) => match self.forward(request, &url).await {
                Ok(response) => {
                    tracing::info!("Served {} in {:?}", url, start.elapsed());
                    response
                }
                Err(e) => {
                    log_failure(&url, &e);
                    e.into_response()
                }
            },
            Err(e) => {
                tracing::warn!("Rejecting malformed request target: {}", e);
                e.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    async fn forward(&self, request: Request<Body>, url: &Url) -> Result<Response, ProxyError> {
        let key = CacheKey::from_url(url);

        if self.cache_enabled {
            let cached = self.cache.get(&key);
            metrics::record_cache_lookup(cached.is_some());
            if let Some(body) = cached {
                tracing::info!("CACHE HIT: {}", url);
                return Ok(Response::new(Body::from(body)));
            }
        }

        let outbound = upstream_request(request, url)?;
        let (parts, body) = with_deadline(self.request_timeout, self.fetch(outbound))
            .await
            .map_err(|DeadlineExceeded(limit)| ProxyError::UpstreamTimeout(limit))??;

        if self.cache_enabled {
            self.cache.put(key, body.clone());
        }

        Ok(Response::from_parts(parts, Body::from(body)))
    }

    /// Dispatch upstream and buffer the whole response body.
    async fn fetch(
        &self,
        outbound: Request<Body>,
    ) -> Result<(axum::http::response::Parts, Bytes), ProxyError> {
        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ProxyError::Upstream(error_chain(&e)))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.body_limit)
            .await
            .map_err(|e| ProxyError::BodyRead(error_chain(&e)))?;
        Ok((parts, body))
    }
}

fn log_failure(url: &Url, error: &ProxyError) {
    if !error.is_server_error() {
        tracing::warn!("Rejected request: {}, error: {}", url, error);
        return;
    }
    match error {
        ProxyError::Upstream(reason) => {
            tracing::error!("Failed to forward request: {}, error: {}", url, reason)
        }
        ProxyError::BodyRead(reason) => {
            tracing::error!("Failed to read response body: {}, error: {}", url, reason)
        }
        ProxyError::UpstreamTimeout(limit) => {
            tracing::error!("Upstream timed out: {}, after {:?}", url, limit)
        }
        other => tracing::error!("Failed to create request: {}, error: {}", url, other),
    }
}

/// Render an error with its sources; hyper-util hides the cause otherwise.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
