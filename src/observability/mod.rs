//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle core produces:
//!     → logging.rs (structured log events through a Logger handle)
//!     → metrics.rs (counters, gauges, durations through a Metrics sink)
//!
//! Background:
//!     → runtime/ (periodic process health samples → Metrics sink)
//! ```
//!
//! # Design Decisions
//! - Collaborators are injected; absent ones are replaced by silent no-ops
//! - Sinks are write-only from the core's point of view

pub mod logging;
pub mod metrics;
pub mod runtime;

pub use logging::Logger;
pub use metrics::{FacadeMetrics, InMemoryMetrics, Metrics, NopMetrics};
