//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 with upgrades, peer address attached)
//!     → security::rate_limit (429 or pass)
//!     → CONNECT  → tunnel.rs (dial, 200, raw byte relay)
//!     → other    → proxy.rs (absolute URL, cache, upstream, cache store)
//!     → Send to client
//! ```

pub mod proxy;
pub mod server;
pub mod tunnel;

pub use proxy::Gateway;
pub use server::{HttpServer, ProxyService};
pub use tunnel::TunnelHandler;
