//! Periodic runtime sampler.
//!
//! # Responsibilities
//! - Take one [`RuntimeSample`] per interval while the context is live
//! - Forward it to the metrics sink under identity-scoped keys
//! - Report GC pauses observed since the previous sample, capped per sample
//!
//! # Design Decisions
//! - No identity, no sampling: there is no namespace to report under
//! - Cancellation wins over a ready tick, so no sample is emitted after it
//! - Excess GC pauses in one interval are dropped, not aggregated

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::stats::{local_hostname, MemoryStats, ProcessStats, RuntimeStatsProvider};
use crate::config::EnvConfig;
use crate::observability::metrics::Metrics;

/// Default time between two samples.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum GC pause durations reported per sample.
pub const MAX_GC_PAUSES_PER_SAMPLE: usize = 10;

static PROCESS_STARTED: OnceLock<Instant> = OnceLock::new();

/// Fallback uptime origin for platforms that do not report a process start
/// time: the first call to this function. Binaries call it first thing in
/// `main`.
pub fn process_started() -> Instant {
    *PROCESS_STARTED.get_or_init(Instant::now)
}

/// Sampler settings.
#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Process identity used in metric keys. `None` or empty disables sampling.
    pub identity: Option<String>,
    pub interval: Duration,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            identity: None,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl SamplerOptions {
    /// Identity from `POD_NAME` or the hostname, interval from
    /// `RUNTIME_METRICS_COLLECTION_INTERVAL`.
    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            identity: resolve_identity(env.pod_name.as_deref(), local_hostname),
            interval: env
                .runtime_metrics_interval
                .map(|d| d.0)
                .unwrap_or(DEFAULT_INTERVAL),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Pod name if set, otherwise whatever `hostname` yields. Empty strings count
/// as absent.
pub fn resolve_identity(
    pod_name: Option<&str>,
    hostname: impl FnOnce() -> Option<String>,
) -> Option<String> {
    match pod_name.filter(|name| !name.is_empty()) {
        Some(name) => Some(name.to_owned()),
        None => hostname().filter(|name| !name.is_empty()),
    }
}

/// Metric keys for one process identity.
struct RuntimeKeys {
    uptime_seconds: String,
    tasks: String,
    threads: String,
    gc_pause: String,
    mem_alloc_bytes: String,
    mem_alloc_bytes_total: String,
    mem_sys_bytes: String,
    mem_heap_alloc_bytes: String,
}

impl RuntimeKeys {
    fn new(identity: &str) -> Self {
        // dots separate key segments
        let id = identity.replace('.', "_");
        Self {
            uptime_seconds: format!("rust.{id}.uptime_seconds"),
            tasks: format!("rust.{id}.tasks"),
            threads: format!("rust.{id}.threads"),
            gc_pause: format!("rust.{id}.gc_pause_seconds"),
            mem_alloc_bytes: format!("rust.{id}.mem_alloc_bytes"),
            mem_alloc_bytes_total: format!("rust.{id}.mem_alloc_bytes_total"),
            mem_sys_bytes: format!("rust.{id}.mem_sys_bytes"),
            mem_heap_alloc_bytes: format!("rust.{id}.mem_heap_alloc_bytes"),
        }
    }
}

/// One snapshot of process health.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSample {
    pub uptime: Duration,
    pub tasks: usize,
    pub threads: usize,
    /// Pauses since the previous sample, most recent first, at most
    /// [`MAX_GC_PAUSES_PER_SAMPLE`].
    pub gc_pauses: Vec<Duration>,
    pub memory: MemoryStats,
}

/// Background task reporting [`RuntimeSample`]s to a [`Metrics`] sink.
pub struct RuntimeSampler<P = ProcessStats> {
    keys: RuntimeKeys,
    interval: Duration,
    metrics: Arc<dyn Metrics>,
    provider: P,
    started: Instant,
    last_gc_cycles: u64,
}

impl RuntimeSampler<ProcessStats> {
    /// Sampler over the current process. `None` when no identity is set.
    pub fn new(options: SamplerOptions, metrics: Arc<dyn Metrics>) -> Option<Self> {
        Self::with_provider(options, metrics, ProcessStats)
    }
}

impl<P: RuntimeStatsProvider> RuntimeSampler<P> {
    pub fn with_provider(
        options: SamplerOptions,
        metrics: Arc<dyn Metrics>,
        provider: P,
    ) -> Option<Self> {
        let identity = options.identity.filter(|id| !id.is_empty())?;
        let interval = if options.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            options.interval
        };

        Some(Self {
            keys: RuntimeKeys::new(&identity),
            interval,
            metrics,
            provider,
            started: process_started(),
            last_gc_cycles: 0,
        })
    }

    /// Sample once per interval until `ctx` is cancelled.
    pub async fn run(mut self, ctx: CancellationToken) {
        tracing::debug!(
            interval_secs = self.interval.as_secs_f64(),
            key = %self.keys.uptime_seconds,
            "Runtime sampler starting"
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = self.sample();
            self.report(&sample);
        }

        tracing::debug!("Runtime sampler stopped");
    }

    /// Read the provider and build a sample, advancing the GC cursor.
    pub fn sample(&mut self) -> RuntimeSample {
        let stats = self.provider.read();

        let new_cycles = stats.gc.cycles.saturating_sub(self.last_gc_cycles);
        let take = usize::try_from(new_cycles)
            .unwrap_or(usize::MAX)
            .min(MAX_GC_PAUSES_PER_SAMPLE);
        let gc_pauses = stats.gc.recent_pauses.into_iter().take(take).collect();
        self.last_gc_cycles = stats.gc.cycles;

        RuntimeSample {
            uptime: stats.uptime.unwrap_or_else(|| self.started.elapsed()),
            tasks: stats.tasks,
            threads: stats.threads,
            gc_pauses,
            memory: stats.memory,
        }
    }

    fn report(&self, sample: &RuntimeSample) {
        let keys = &self.keys;
        let m = &self.metrics;

        m.gauge(&keys.uptime_seconds, sample.uptime.as_secs_f64());
        m.gauge(&keys.tasks, sample.tasks as f64);
        m.gauge(&keys.threads, sample.threads as f64);

        for pause in &sample.gc_pauses {
            m.duration(&keys.gc_pause, *pause);
        }

        m.gauge(&keys.mem_alloc_bytes, sample.memory.alloc_bytes as f64);
        m.gauge(&keys.mem_alloc_bytes_total, sample.memory.total_alloc_bytes as f64);
        m.gauge(&keys.mem_sys_bytes, sample.memory.sys_bytes as f64);
        m.gauge(&keys.mem_heap_alloc_bytes, sample.memory.heap_alloc_bytes as f64);
    }
}

/// Run a process sampler until `ctx` is cancelled. Returns at once when the
/// options carry no identity.
pub async fn serve_runtime_metrics(
    ctx: CancellationToken,
    metrics: Arc<dyn Metrics>,
    options: SamplerOptions,
) {
    match RuntimeSampler::new(options, metrics) {
        Some(sampler) => sampler.run(ctx).await,
        None => tracing::debug!("No process identity, runtime metrics disabled"),
    }
}
