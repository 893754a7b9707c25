//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (plain or CONNECT):
//!     → rate_limit.rs (per-IP fixed-window counter)
//!         → 429 Too Many Requests, or
//!         → dispatch (gateway / tunnel)
//! ```
//!
//! # Design Decisions
//! - The gate wraps every request before any forwarding logic runs
//! - Counters reset for all clients together on a timer, not per entry
//! - Tunneled bytes are never counted after the CONNECT handshake

pub mod rate_limit;

pub use rate_limit::{client_ip, Admission, RateLimitLayer, RateLimiter};
