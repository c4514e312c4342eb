//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! accept() fails in the serve loop:
//!     → backoff.rs (delay grows 5ms → 1s per consecutive failure)
//!     → retry accept
//!     → success resets the attempt counter
//! ```
//!
//! # Design Decisions
//! - Accept errors never end the serve loop; only shutdown does
//! - Fixed schedule, no jitter

pub mod backoff;

pub use backoff::accept_backoff;
