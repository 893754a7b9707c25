//! Caching, rate-limited forward HTTP proxy with CONNECT tunneling.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;

pub use cache::{CacheKey, CacheStore};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::RateLimiter;
