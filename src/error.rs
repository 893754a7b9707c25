//! Request-path error taxonomy.
//!
//! Every failure on the proxy path terminates only the request (or tunnel)
//! it belongs to. Variants carry the detail that is logged; clients only ever
//! see [`ProxyError::user_message`].

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced to a proxied client.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The rewritten absolute target could not be parsed as a URL.
    #[error("malformed request target: {0}")]
    MalformedUrl(String),

    /// A CONNECT request did not name a `host:port`.
    #[error("invalid tunnel target: {0}")]
    InvalidTunnelTarget(String),

    /// The outbound request could not be assembled.
    #[error("failed to build upstream request: {0}")]
    RequestBuild(String),

    /// Transport failure talking to the origin (refused, DNS, reset).
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The origin did not answer within the request deadline.
    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(std::time::Duration),

    /// The origin's response body could not be read in full.
    #[error("failed to read upstream body: {0}")]
    BodyRead(String),

    /// Dialing the CONNECT destination failed.
    #[error("failed to connect to {host}: {reason}")]
    TunnelConnect { host: String, reason: String },

    /// The inbound connection cannot hand over its raw byte stream.
    #[error("connection does not support raw takeover")]
    UpgradeUnsupported,

    /// The client used up its quota for the current window.
    #[error("rate limit exceeded for client {0}")]
    RateLimited(String),
}

impl ProxyError {
    /// HTTP status returned to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedUrl(_) | Self::InvalidTunnelTarget(_) => StatusCode::BAD_REQUEST,
            Self::RequestBuild(_) | Self::Upstream(_) | Self::BodyRead(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::TunnelConnect { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpgradeUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message; never includes upstream details.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MalformedUrl(_) | Self::InvalidTunnelTarget(_) => "Bad request",
            Self::RequestBuild(_) => "Failed to create request",
            Self::Upstream(_) => "Failed to forward request",
            Self::UpstreamTimeout(_) => "Upstream timed out",
            Self::BodyRead(_) => "Failed to read response body",
            Self::TunnelConnect { .. } => "Failed to connect to destination",
            Self::UpgradeUnsupported => "Tunneling not supported",
            Self::RateLimited(_) => "Too Many Requests",
        }
    }

    /// Whether this is a failure worth logging at error level.
    ///
    /// Rate-limit rejections and malformed input are expected outcomes and
    /// are logged as warnings.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(format!("{}\n", self.user_message())));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
