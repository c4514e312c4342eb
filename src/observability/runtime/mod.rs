//! Runtime telemetry.
//!
//! # Data Flow
//! ```text
//! RuntimeStatsProvider (stats.rs)
//!     → RuntimeSampler (sampler.rs): one RuntimeSample per interval
//!     → Metrics sink (gauges + GC pause durations)
//!
//! CountingAllocator (alloc.rs) feeds the memory counters when installed.
//! ```

pub mod alloc;
pub mod sampler;
pub mod stats;

pub use alloc::{allocation_stats, AllocationCounters, AllocationStats, CountingAllocator};
pub use sampler::{
    process_started, resolve_identity, serve_runtime_metrics, RuntimeSample, RuntimeSampler,
    SamplerOptions,
};
pub use stats::{GcStats, MemoryStats, ProcessStats, RuntimeStats, RuntimeStatsProvider};
