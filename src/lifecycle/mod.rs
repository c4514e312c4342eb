//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → TerminationSignal
//!
//! Shutdown (shutdown.rs):
//!     First of {server fault, signal, context cancelled} → ShutdownTrigger
//!     → Shutdown::trigger (stop accepting, drain connections)
//!     → drain_within(shutdown timeout)
//! ```
//!
//! # Design Decisions
//! - Exactly one trigger per listen cycle
//! - Shutdown has timeout: zero means wait for the drain forever

pub mod shutdown;
pub mod signals;

pub use shutdown::{drain_within, DrainTimedOut, Shutdown, ShutdownTrigger};
pub use signals::{TerminationSignal, TerminationSignals};
