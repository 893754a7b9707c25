//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream operation (dial, dispatch, body read):
//!     → timeouts.rs (enforce connect/request deadline)
//!     → on expiry: 504 to the client, connection task freed
//! ```
//!
//! # Design Decisions
//! - No retries: every failure is surfaced to the client once
//! - Deadlines are configurable and may be disabled

pub mod timeouts;

pub use timeouts::{with_deadline, DeadlineExceeded};
