//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ReadinessInfo::collect (host facts + GIT_COMMIT)
//!     → readiness.rs serves GET /_info on READINESS_PORT
//!     → stops when the lifecycle context is cancelled
//!
//! On demand:
//!     GET /debug/pprof/{profile,flamegraph}
//!     → profiler.rs samples the process, returns a gzipped report
//! ```
//!
//! # Design Decisions
//! - Runs on its own port, outside the service's middleware and signal
//!   handling

pub mod profiler;
pub mod readiness;

pub use profiler::profiler_router;
pub use readiness::{readiness_router, serve_readiness, ReadinessInfo, DEFAULT_READINESS_PORT};
