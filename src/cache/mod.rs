//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! absolute request URL
//!     → key.rs (SHA-256 digest of the canonical URL string)
//!     → store.rs (lookup before dispatch, store after a successful fetch)
//! ```
//!
//! # Design Decisions
//! - Only the response body is cached; status and headers are not
//! - Last writer wins, entries live until the process exits
//! - The map lock is held for the map operation only, never across I/O

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::CacheStore;
